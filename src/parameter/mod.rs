//! Parameter model: keys, values, entries and the store

mod entry;
mod key;
mod store;
mod value;

pub use entry::{Outbound, ParameterEntry, ParseContext};
pub use key::{CcKey, KeyId, NrpnKey, ParameterKey, PcKey, MAX_14BIT, MAX_7BIT};
pub use store::{DefaultHandler, Dispatch, EntryHandle, ParameterStore};
pub use value::{ParameterValue, ValueKind};
