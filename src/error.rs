//! Error types for the virtual device
//!
//! Construction-time problems (duplicate keys, unencodable values) are
//! returned as errors. Problems with inbound traffic are reported through
//! `DeviceStats` and never escape `receive()` or `tick()`.

use thiserror::Error;

use crate::parameter::KeyId;

/// Errors raised by parameter keys, entries and the store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParameterError {
    /// A parameter with the same canonical id is already registered
    #[error("duplicate parameter key {0}")]
    DuplicateKey(KeyId),

    /// The key's wire format cannot carry this kind of value
    #[error("{key} cannot encode a {kind} value")]
    UnsupportedValueType { key: String, kind: &'static str },

    /// Numeric value does not fit into the key's wire format
    #[error("value {value} out of range for {key} (max {max})")]
    ValueOutOfRange { key: String, value: i32, max: i32 },

    /// Value bytes do not have the expected length or terminator
    #[error("malformed value bytes for {key}: {reason}")]
    Malformed { key: String, reason: String },

    /// Entry has neither a send key nor any receive key
    #[error("parameter entry needs at least one key")]
    NoKeys,
}

/// Errors raised while decoding inbound frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Bytes look like a candidate frame but fail length/terminator checks
    #[error("malformed message: {reason}")]
    Malformed { reason: String },
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<ParameterError> for ProtocolError {
    fn from(err: ParameterError) -> Self {
        ProtocolError::malformed(err.to_string())
    }
}

/// Top-level device error
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("parameter: {0}")]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type Result<T, E = DeviceError> = std::result::Result<T, E>;
