//! Parameter keys and their wire encodings
//!
//! A key is the identity of one addressable value plus the rules to turn a
//! `ParameterValue` into payload bytes and back:
//!
//! - **NRPN**: two-byte address inside a vendor SysEx frame. Numbers travel
//!   as 14-bit `msb, lsb`; text travels as ASCII plus one `0x00` terminator.
//! - **CC**: controller number, optional integer scale (wire value is
//!   `value / scale`, decoded value is `byte * scale`).
//! - **PC**: program change, no payload of its own.

use std::fmt;

use super::value::{ParameterValue, ValueKind};
use crate::error::ParameterError;

/// Largest 14-bit value
pub const MAX_14BIT: i32 = 16383;
/// Largest 7-bit value
pub const MAX_7BIT: i32 = 127;

/// Canonical identity of a key, unique within a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyId {
    Nrpn(u8, u8),
    Cc(u8),
    Pc,
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Nrpn(hi, lo) => write!(f, "nrpn:{:02X}:{:02X}", hi, lo),
            KeyId::Cc(controller) => write!(f, "cc:{}", controller),
            KeyId::Pc => write!(f, "pc"),
        }
    }
}

/// NRPN address carried in SysEx frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NrpnKey {
    pub address_hi: u8,
    pub address_lo: u8,
}

/// Control change controller with optional scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcKey {
    pub controller: u8,
    pub scale: Option<u16>,
}

/// Program change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PcKey;

/// Key of a parameter entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKey {
    Nrpn(NrpnKey),
    Cc(CcKey),
    Pc(PcKey),
}

impl ParameterKey {
    pub fn nrpn(address_hi: u8, address_lo: u8) -> Self {
        ParameterKey::Nrpn(NrpnKey {
            address_hi: address_hi & 0x7F,
            address_lo: address_lo & 0x7F,
        })
    }

    pub fn cc(controller: u8) -> Self {
        ParameterKey::Cc(CcKey {
            controller: controller & 0x7F,
            scale: None,
        })
    }

    /// CC key whose wire value is `value / scale`. A scale of 0 or 1 means none.
    pub fn cc_scaled(controller: u8, scale: u16) -> Self {
        ParameterKey::Cc(CcKey {
            controller: controller & 0x7F,
            scale: (scale > 1).then_some(scale),
        })
    }

    pub fn pc() -> Self {
        ParameterKey::Pc(PcKey)
    }

    pub fn id(&self) -> KeyId {
        match self {
            ParameterKey::Nrpn(k) => KeyId::Nrpn(k.address_hi, k.address_lo),
            ParameterKey::Cc(k) => KeyId::Cc(k.controller),
            ParameterKey::Pc(_) => KeyId::Pc,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ParameterKey::Nrpn(k) => format!("NRPN {}:{}", k.address_hi, k.address_lo),
            ParameterKey::Cc(CcKey {
                controller,
                scale: Some(scale),
            }) => format!("CC {} (x{})", controller, scale),
            ParameterKey::Cc(k) => format!("CC {}", k.controller),
            ParameterKey::Pc(_) => "PC".to_string(),
        }
    }

    /// Encode a value into payload bytes
    pub fn encode(&self, value: &ParameterValue) -> Result<Vec<u8>, ParameterError> {
        match (self, value) {
            (ParameterKey::Nrpn(_), ParameterValue::Number(n)) => {
                let n = self.check_range(*n, MAX_14BIT)?;
                Ok(vec![(n / 128) as u8, (n % 128) as u8])
            }
            (ParameterKey::Nrpn(_), ParameterValue::Text(s)) => {
                if !s.is_ascii() || s.bytes().any(|b| b == 0) {
                    return Err(self.unsupported("non-ASCII text"));
                }
                let mut bytes = Vec::with_capacity(s.len() + 1);
                bytes.extend_from_slice(s.as_bytes());
                bytes.push(0x00);
                Ok(bytes)
            }
            (ParameterKey::Cc(k), ParameterValue::Number(n)) => {
                let scale = k.scale.map(i32::from).unwrap_or(1);
                let n = self.check_range(*n, MAX_7BIT * scale)?;
                Ok(vec![(n / scale) as u8])
            }
            (ParameterKey::Cc(_), ParameterValue::Text(_)) => Err(self.unsupported("text")),
            (ParameterKey::Pc(_), _) => Ok(Vec::new()),
        }
    }

    /// Decode payload bytes into a value of the given shape
    ///
    /// Program change keys carry no payload and decode to `None`.
    pub fn decode(
        &self,
        bytes: &[u8],
        kind: ValueKind,
    ) -> Result<Option<ParameterValue>, ParameterError> {
        match (self, kind) {
            (ParameterKey::Nrpn(_), ValueKind::Numeric) => match bytes {
                [msb, lsb] => Ok(Some(ParameterValue::Number(
                    i32::from(*msb & 0x7F) * 128 + i32::from(*lsb & 0x7F),
                ))),
                _ => Err(self.malformed(format!("expected 2 value bytes, got {}", bytes.len()))),
            },
            (ParameterKey::Nrpn(_), ValueKind::Text) => {
                if bytes.last() != Some(&0x00) {
                    return Err(self.malformed("missing string terminator"));
                }
                let text: String = bytes
                    .iter()
                    .take_while(|&&b| b != 0x00)
                    .map(|&b| char::from(b & 0x7F))
                    .collect();
                Ok(Some(ParameterValue::Text(text)))
            }
            (ParameterKey::Cc(k), ValueKind::Numeric) => match bytes {
                [value] => {
                    let scale = k.scale.map(i32::from).unwrap_or(1);
                    Ok(Some(ParameterValue::Number(i32::from(*value & 0x7F) * scale)))
                }
                _ => Err(self.malformed(format!("expected 1 value byte, got {}", bytes.len()))),
            },
            (ParameterKey::Cc(_), ValueKind::Text) => Err(self.unsupported("text")),
            (ParameterKey::Pc(_), _) => Ok(None),
        }
    }

    fn check_range(&self, value: i32, max: i32) -> Result<i32, ParameterError> {
        if (0..=max).contains(&value) {
            Ok(value)
        } else {
            Err(ParameterError::ValueOutOfRange {
                key: self.display_name(),
                value,
                max,
            })
        }
    }

    fn unsupported(&self, kind: &'static str) -> ParameterError {
        ParameterError::UnsupportedValueType {
            key: self.display_name(),
            kind,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ParameterError {
        ParameterError::Malformed {
            key: self.display_name(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}
