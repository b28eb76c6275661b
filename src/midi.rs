//! MIDI framing for the Kemper SysEx dialect
//!
//! Provides the frame header, inbound message decoding, frame encoding and
//! hex formatting for logs.

use std::fmt;

use crate::error::ProtocolError;

/// Kemper manufacturer id (three bytes after 0xF0)
pub const MANUFACTURER_ID: [u8; 3] = [0x00, 0x20, 0x33];

/// SysEx start / end bytes
pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// Channel voice status bytes (channel 1 only)
pub const STATUS_CC: u8 = 0xB0;
pub const STATUS_PC: u8 = 0xC0;

/// Device id meaning "any device"
pub const OMNI_DEVICE_ID: u8 = 0x7F;

/// Product type the device reports unless configured otherwise
pub const DEFAULT_PRODUCT_TYPE: u8 = 0x02;

/// Function codes
pub mod function {
    /// Single numeric parameter change (host→device set, device→host return)
    pub const SINGLE_PARAMETER: u8 = 0x01;
    /// String parameter change
    pub const STRING_PARAMETER: u8 = 0x03;
    /// Request single numeric parameter
    pub const REQUEST_SINGLE_PARAMETER: u8 = 0x41;
    /// Request string parameter
    pub const REQUEST_STRING_PARAMETER: u8 = 0x43;
    /// Bidirectional session frames (beacon, keep-alive)
    pub const BIDIRECTIONAL: u8 = 0x7E;
}

/// `F0` + manufacturer id + product type + device id
const HEADER_LEN: usize = 6;
/// Header + function + instance + two address bytes + `F7`
const MIN_SYSEX_LEN: usize = HEADER_LEN + 4 + 1;

/// Product type and device id shared by every SysEx frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub product_type: u8,
    pub device_id: u8,
}

impl FrameHeader {
    pub fn new(product_type: u8, device_id: u8) -> Self {
        Self {
            product_type,
            device_id,
        }
    }

    /// Leading bytes of every SysEx frame, without function code
    pub fn bytes(&self) -> [u8; HEADER_LEN] {
        [
            SYSEX_START,
            MANUFACTURER_ID[0],
            MANUFACTURER_ID[1],
            MANUFACTURER_ID[2],
            self.product_type & 0x7F,
            self.device_id & 0x7F,
        ]
    }

    fn accepts(&self, product_type: u8, device_id: u8) -> bool {
        product_type == self.product_type
            && (device_id == self.device_id || device_id == OMNI_DEVICE_ID)
    }
}

/// Inbound or outbound message in the device's dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Vendor SysEx frame: function code, instance, address and raw payload
    Sysex {
        function: u8,
        instance: u8,
        address_hi: u8,
        address_lo: u8,
        payload: Vec<u8>,
    },

    /// Control Change on channel 1
    ControlChange { controller: u8, value: u8 },

    /// Program Change on channel 1
    ProgramChange { program: u8 },
}

impl Message {
    /// Decode raw bytes
    ///
    /// Returns `Ok(None)` for bytes that are not addressed to this device
    /// (other manufacturers, other channels, other product types) and
    /// `Err(Malformed)` for candidate frames that fail length, terminator or
    /// data-byte checks.
    pub fn parse(data: &[u8], header: &FrameHeader) -> Result<Option<Self>, ProtocolError> {
        let Some(&status) = data.first() else {
            return Ok(None);
        };

        match status {
            SYSEX_START => Self::parse_sysex(data, header),
            0xB0..=0xBF => {
                if status != STATUS_CC {
                    return Ok(None);
                }
                if data.len() != 3 {
                    return Err(ProtocolError::malformed(format!(
                        "control change must be 3 bytes, got {}",
                        data.len()
                    )));
                }
                check_data_bytes(&data[1..])?;
                Ok(Some(Message::ControlChange {
                    controller: data[1],
                    value: data[2],
                }))
            }
            0xC0..=0xCF => {
                if status != STATUS_PC {
                    return Ok(None);
                }
                if data.len() != 2 {
                    return Err(ProtocolError::malformed(format!(
                        "program change must be 2 bytes, got {}",
                        data.len()
                    )));
                }
                check_data_bytes(&data[1..])?;
                Ok(Some(Message::ProgramChange { program: data[1] }))
            }
            _ => Ok(None),
        }
    }

    fn parse_sysex(data: &[u8], header: &FrameHeader) -> Result<Option<Self>, ProtocolError> {
        if data.len() < 4 || data[1..4] != MANUFACTURER_ID {
            return Ok(None);
        }
        if data.last() != Some(&SYSEX_END) {
            return Err(ProtocolError::malformed("missing SysEx terminator"));
        }
        let body = &data[1..data.len() - 1];
        check_data_bytes(body)?;
        if data.len() < MIN_SYSEX_LEN {
            return Err(ProtocolError::malformed(format!(
                "SysEx frame too short ({} bytes)",
                data.len()
            )));
        }
        if !header.accepts(data[4], data[5]) {
            return Ok(None);
        }

        Ok(Some(Message::Sysex {
            function: data[6],
            instance: data[7],
            address_hi: data[8],
            address_lo: data[9],
            payload: data[10..data.len() - 1].to_vec(),
        }))
    }

    /// Encode the message to bytes using the given header for SysEx frames
    pub fn encode(&self, header: &FrameHeader) -> Vec<u8> {
        match self {
            Message::Sysex {
                function,
                instance,
                address_hi,
                address_lo,
                payload,
            } => {
                let mut result = Vec::with_capacity(MIN_SYSEX_LEN + payload.len());
                result.extend_from_slice(&header.bytes());
                result.extend_from_slice(&[
                    function & 0x7F,
                    instance & 0x7F,
                    address_hi & 0x7F,
                    address_lo & 0x7F,
                ]);
                result.extend(payload.iter().map(|b| b & 0x7F));
                result.push(SYSEX_END);
                result
            }
            Message::ControlChange { controller, value } => {
                vec![STATUS_CC, controller & 0x7F, value & 0x7F]
            }
            Message::ProgramChange { program } => vec![STATUS_PC, program & 0x7F],
        }
    }
}

fn check_data_bytes(bytes: &[u8]) -> Result<(), ProtocolError> {
    match bytes.iter().position(|&b| b >= 0x80) {
        Some(pos) => Err(ProtocolError::malformed(format!(
            "status byte {:02X} inside message at offset {}",
            bytes[pos],
            pos + 1
        ))),
        None => Ok(()),
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Sysex {
                function,
                address_hi,
                address_lo,
                payload,
                ..
            } => write!(
                f,
                "SysEx fn:{:02X} addr:{:02X}:{:02X} {} bytes",
                function,
                address_hi,
                address_lo,
                payload.len()
            ),
            Message::ControlChange { controller, value } => {
                write!(f, "CC cc:{} v:{}", controller, value)
            }
            Message::ProgramChange { program } => write!(f, "ProgramChange p:{}", program),
        }
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a frame for console output
pub fn format_frame(timestamp_ms: u64, direction: &str, header: &FrameHeader, data: &[u8]) -> String {
    let hex = format_hex(data);
    let message = Message::parse(data, header)
        .ok()
        .flatten()
        .map(|m| format!(" => {}", m))
        .unwrap_or_default();

    format!("[{:08}ms] {} | {}{}", timestamp_ms, direction, hex, message)
}
