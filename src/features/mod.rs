//! Periodic device behaviors driven by `tick()`

pub mod morph;
pub mod tempo;
pub mod tuner;

pub use morph::MorphController;
pub use tempo::{TempoCallback, TempoController};
pub use tuner::TunerController;
