//! Kemper Sim - a virtual Kemper unit speaking the SysEx/NRPN dialect
//!
//! The crate is a passive protocol partner: the host feeds inbound frames to
//! [`VirtualDevice::receive`], drives [`VirtualDevice::tick`] on a steady
//! interval and forwards whatever the device queues for output.

pub mod cli;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod features;
pub mod midi;
pub mod parameter;
pub mod preset;
pub mod protocol;

pub use clock::{ManualClock, SystemClock, TimeSource};
pub use config::DeviceConfig;
pub use device::{DeviceStats, VirtualDevice};
pub use error::{DeviceError, ParameterError, ProtocolError, Result};
pub use midi::{FrameHeader, Message};
pub use parameter::{EntryHandle, ParameterEntry, ParameterKey, ParameterStore, ParameterValue};
pub use protocol::{ConnectionState, ProtocolStateMachine};
