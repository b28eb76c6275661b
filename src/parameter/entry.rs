//! Parameter entries and the outbound queue

use std::collections::{BTreeSet, VecDeque};

use tracing::trace;

use super::key::{KeyId, ParameterKey, MAX_7BIT};
use super::value::{ParameterValue, ValueKind};
use crate::error::ParameterError;
use crate::midi::{format_hex, function, FrameHeader, Message};

/// FIFO of outbound frames, drained by the host
#[derive(Debug, Default)]
pub struct Outbound {
    queue: VecDeque<Vec<u8>>,
    sent: u64,
}

impl Outbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Vec<u8>) {
        trace!("OUT {}", format_hex(&frame));
        self.sent += 1;
        self.queue.push_back(frame);
    }

    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    /// Take every queued frame in FIFO order
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of frames ever queued
    pub fn sent_count(&self) -> u64 {
        self.sent
    }
}

/// Per-message context handed down from the device
#[derive(Debug, Clone, Copy)]
pub struct ParseContext {
    pub header: FrameHeader,
    /// Echo set frames back as return frames (handshake `echo` flag)
    pub echo: bool,
}

impl ParseContext {
    pub fn new(header: FrameHeader) -> Self {
        Self {
            header,
            echo: false,
        }
    }
}

/// One addressable value of the device
#[derive(Debug, Clone)]
pub struct ParameterEntry {
    name: Option<String>,
    send_key: Option<ParameterKey>,
    receive_keys: Vec<ParameterKey>,
    value: ParameterValue,
    parameter_sets: BTreeSet<u8>,
    request_function: u8,
    set_function: u8,
    return_function: u8,
}

impl ParameterEntry {
    /// Create an entry from explicit keys
    ///
    /// Without receive keys the entry receives on its send key. With both,
    /// the send key is appended to the receive keys so echoes on it are
    /// accepted.
    pub fn new(
        send_key: Option<ParameterKey>,
        receive_keys: Vec<ParameterKey>,
        value: ParameterValue,
    ) -> Result<Self, ParameterError> {
        let mut receive_keys = receive_keys;
        if let Some(send_key) = send_key {
            if !receive_keys.contains(&send_key) {
                receive_keys.push(send_key);
            }
        }
        if receive_keys.is_empty() {
            return Err(ParameterError::NoKeys);
        }

        let (request_function, set_function, return_function) = default_functions(value.kind());
        Ok(Self {
            name: None,
            send_key,
            receive_keys,
            value,
            parameter_sets: BTreeSet::new(),
            request_function,
            set_function,
            return_function,
        })
    }

    fn with_key(key: ParameterKey, value: ParameterValue) -> Self {
        let (request_function, set_function, return_function) = default_functions(value.kind());
        Self {
            name: None,
            send_key: Some(key),
            receive_keys: vec![key],
            value,
            parameter_sets: BTreeSet::new(),
            request_function,
            set_function,
            return_function,
        }
    }

    /// Numeric NRPN parameter, initial value 0
    pub fn numeric(address_hi: u8, address_lo: u8) -> Self {
        Self::with_key(
            ParameterKey::nrpn(address_hi, address_lo),
            ParameterValue::default_for(ValueKind::Numeric),
        )
    }

    /// String NRPN parameter, initial value ""
    pub fn text(address_hi: u8, address_lo: u8) -> Self {
        Self::with_key(
            ParameterKey::nrpn(address_hi, address_lo),
            ParameterValue::default_for(ValueKind::Text),
        )
    }

    pub fn cc(controller: u8) -> Self {
        Self::with_key(ParameterKey::cc(controller), ParameterValue::Number(0))
    }

    pub fn cc_scaled(controller: u8, scale: u16) -> Self {
        Self::with_key(ParameterKey::cc_scaled(controller, scale), ParameterValue::Number(0))
    }

    pub fn program_change() -> Self {
        Self::with_key(ParameterKey::pc(), ParameterValue::Number(0))
    }

    /// Numeric entry on `key` with value 0
    pub fn for_key(key: ParameterKey) -> Self {
        Self::with_key(key, ParameterValue::Number(0))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn in_sets(mut self, sets: impl IntoIterator<Item = u8>) -> Self {
        self.parameter_sets.extend(sets);
        self
    }

    pub fn with_value(mut self, value: impl Into<ParameterValue>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_functions(mut self, request: u8, set: u8, ret: u8) -> Self {
        self.request_function = request;
        self.set_function = set;
        self.return_function = ret;
        self
    }

    /// Canonical id: the send key's id, else the first receive key's
    pub fn id(&self) -> KeyId {
        self.send_key
            .as_ref()
            .unwrap_or(&self.receive_keys[0])
            .id()
    }

    /// Every id this entry answers to, without duplicates
    pub fn ids(&self) -> Vec<KeyId> {
        let mut ids: Vec<KeyId> = Vec::with_capacity(self.receive_keys.len() + 1);
        for id in self
            .send_key
            .iter()
            .chain(self.receive_keys.iter())
            .map(ParameterKey::id)
        {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .send_key
                .as_ref()
                .unwrap_or(&self.receive_keys[0])
                .display_name(),
        }
    }

    pub fn send_key(&self) -> Option<&ParameterKey> {
        self.send_key.as_ref()
    }

    pub fn receive_keys(&self) -> &[ParameterKey] {
        &self.receive_keys
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }

    pub fn parameter_sets(&self) -> &BTreeSet<u8> {
        &self.parameter_sets
    }

    pub fn in_set(&self, set: u8) -> bool {
        self.parameter_sets.contains(&set)
    }

    /// Update the stored value without notifying anyone
    pub fn set_value(&mut self, value: impl Into<ParameterValue>) {
        self.value = value.into();
    }

    /// Queue one frame carrying the current value on the send key
    ///
    /// Returns `false` for receive-only entries.
    pub fn send(&self, header: &FrameHeader, out: &mut Outbound) -> Result<bool, ParameterError> {
        let Some(key) = self.send_key else {
            return Ok(false);
        };
        let frame = self.frame(&key, header)?;
        trace!("{} -> {}", self.display_name(), self.value);
        out.push(frame);
        Ok(true)
    }

    fn frame(&self, key: &ParameterKey, header: &FrameHeader) -> Result<Vec<u8>, ParameterError> {
        let message = match key {
            ParameterKey::Nrpn(k) => Message::Sysex {
                function: self.return_function,
                instance: 0x00,
                address_hi: k.address_hi,
                address_lo: k.address_lo,
                payload: key.encode(&self.value)?,
            },
            ParameterKey::Cc(k) => Message::ControlChange {
                controller: k.controller,
                value: key.encode(&self.value)?.first().copied().unwrap_or(0),
            },
            ParameterKey::Pc(_) => {
                key.encode(&self.value)?;
                let program = match self.value {
                    ParameterValue::Number(n) if (0..=MAX_7BIT).contains(&n) => n as u8,
                    ParameterValue::Number(n) => {
                        return Err(ParameterError::ValueOutOfRange {
                            key: key.display_name(),
                            value: n,
                            max: MAX_7BIT,
                        })
                    }
                    ParameterValue::Text(_) => {
                        return Err(ParameterError::UnsupportedValueType {
                            key: key.display_name(),
                            kind: "text",
                        })
                    }
                };
                Message::ProgramChange { program }
            }
        };
        Ok(message.encode(header))
    }

    /// Try to consume an inbound message
    ///
    /// A set frame (or CC/PC) on one of the receive keys updates the value.
    /// A request frame queues the current value instead of changing it.
    pub fn parse(
        &mut self,
        message: &Message,
        ctx: &ParseContext,
        out: &mut Outbound,
    ) -> Result<bool, ParameterError> {
        let Some(key) = self
            .receive_keys
            .iter()
            .copied()
            .find(|key| addresses(key, message))
        else {
            return Ok(false);
        };

        match message {
            Message::Sysex {
                function, payload, ..
            } => {
                if *function == self.request_function {
                    if !payload.is_empty() {
                        return Err(ParameterError::Malformed {
                            key: key.display_name(),
                            reason: format!("request carries {} payload bytes", payload.len()),
                        });
                    }
                    self.send(&ctx.header, out)?;
                    return Ok(true);
                }
                if *function != self.set_function {
                    return Ok(false);
                }
                if let Some(value) = key.decode(payload, self.kind())? {
                    self.set_value(value);
                }
            }
            Message::ControlChange { value, .. } => {
                if let Some(value) = key.decode(&[*value], self.kind())? {
                    self.set_value(value);
                }
            }
            Message::ProgramChange { program } => {
                self.set_value(i32::from(*program));
            }
        }

        if ctx.echo {
            self.send(&ctx.header, out)?;
        }
        Ok(true)
    }
}

/// Whether `message` is addressed to `key`, ignoring the function code
pub(crate) fn addresses(key: &ParameterKey, message: &Message) -> bool {
    match (key, message) {
        (
            ParameterKey::Nrpn(k),
            Message::Sysex {
                address_hi,
                address_lo,
                function,
                ..
            },
        ) => {
            *function != function::BIDIRECTIONAL
                && k.address_hi == *address_hi
                && k.address_lo == *address_lo
        }
        (ParameterKey::Cc(k), Message::ControlChange { controller, .. }) => {
            k.controller == *controller
        }
        (ParameterKey::Pc(_), Message::ProgramChange { .. }) => true,
        _ => false,
    }
}

fn default_functions(kind: ValueKind) -> (u8, u8, u8) {
    match kind {
        ValueKind::Numeric => (
            function::REQUEST_SINGLE_PARAMETER,
            function::SINGLE_PARAMETER,
            function::SINGLE_PARAMETER,
        ),
        ValueKind::Text => (
            function::REQUEST_STRING_PARAMETER,
            function::STRING_PARAMETER,
            function::STRING_PARAMETER,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::new(FrameHeader::new(0x02, 0x7F))
    }

    fn sysex(function: u8, hi: u8, lo: u8, payload: Vec<u8>) -> Message {
        Message::Sysex {
            function,
            instance: 0,
            address_hi: hi,
            address_lo: lo,
            payload,
        }
    }

    #[test]
    fn test_send_numeric() {
        let entry = ParameterEntry::numeric(60, 5).with_value(42);
        let mut out = Outbound::new();

        assert!(entry.send(&ctx().header, &mut out).unwrap());
        assert_eq!(
            out.pop().unwrap(),
            vec![0xF0, 0x00, 0x20, 0x33, 0x02, 0x7F, 0x01, 0x00, 0x3C, 0x05, 0x00, 0x2A, 0xF7]
        );
    }

    #[test]
    fn test_send_text() {
        let entry = ParameterEntry::text(0, 1).with_value("Hi");
        let mut out = Outbound::new();

        entry.send(&ctx().header, &mut out).unwrap();
        assert_eq!(
            out.pop().unwrap(),
            vec![0xF0, 0x00, 0x20, 0x33, 0x02, 0x7F, 0x03, 0x00, 0x00, 0x01, b'H', b'i', 0x00, 0xF7]
        );
    }

    #[test]
    fn test_send_cc_and_pc() {
        let mut out = Outbound::new();
        ParameterEntry::cc_scaled(7, 129)
            .with_value(16383)
            .send(&ctx().header, &mut out)
            .unwrap();
        ParameterEntry::program_change()
            .with_value(4)
            .send(&ctx().header, &mut out)
            .unwrap();

        assert_eq!(out.drain(), vec![vec![0xB0, 7, 127], vec![0xC0, 4]]);
    }

    #[test]
    fn test_set_frame_updates_value_without_sending() {
        let mut entry = ParameterEntry::numeric(60, 5);
        let mut out = Outbound::new();

        let parsed = entry
            .parse(&sysex(0x01, 60, 5, vec![0x01, 0x00]), &ctx(), &mut out)
            .unwrap();

        assert!(parsed);
        assert_eq!(entry.value(), &ParameterValue::Number(128));
        assert!(out.is_empty());
    }

    #[test]
    fn test_request_frame_sends_without_changing() {
        let mut entry = ParameterEntry::numeric(60, 5).with_value(7);
        let mut out = Outbound::new();

        assert!(entry
            .parse(&sysex(0x41, 60, 5, vec![]), &ctx(), &mut out)
            .unwrap());
        assert_eq!(entry.value(), &ParameterValue::Number(7));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_echo_on_set() {
        let mut entry = ParameterEntry::numeric(60, 5);
        let mut out = Outbound::new();
        let ctx = ParseContext {
            echo: true,
            ..ctx()
        };

        entry
            .parse(&sysex(0x01, 60, 5, vec![0x00, 0x05]), &ctx, &mut out)
            .unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_other_address_or_function_not_matched() {
        let mut entry = ParameterEntry::numeric(60, 5);
        let mut out = Outbound::new();

        assert!(!entry
            .parse(&sysex(0x01, 60, 6, vec![0, 1]), &ctx(), &mut out)
            .unwrap());
        assert!(!entry
            .parse(&sysex(0x03, 60, 5, vec![0]), &ctx(), &mut out)
            .unwrap());
    }

    #[test]
    fn test_bad_value_length_is_malformed() {
        let mut entry = ParameterEntry::numeric(60, 5);
        let mut out = Outbound::new();

        assert!(matches!(
            entry.parse(&sysex(0x01, 60, 5, vec![1]), &ctx(), &mut out),
            Err(ParameterError::Malformed { .. })
        ));
    }

    #[test]
    fn test_send_key_is_also_received() {
        let entry = ParameterEntry::new(
            Some(ParameterKey::cc(10)),
            vec![ParameterKey::cc(11)],
            ParameterValue::Number(0),
        )
        .unwrap();

        assert_eq!(
            entry.receive_keys(),
            &[ParameterKey::cc(11), ParameterKey::cc(10)]
        );
        assert_eq!(entry.id(), KeyId::Cc(10));
        assert_eq!(entry.ids(), vec![KeyId::Cc(10), KeyId::Cc(11)]);
    }

    #[test]
    fn test_receive_keys_default_to_send_key() {
        let entry =
            ParameterEntry::new(Some(ParameterKey::cc(10)), vec![], ParameterValue::Number(0))
                .unwrap();
        assert_eq!(entry.receive_keys(), &[ParameterKey::cc(10)]);
    }

    #[test]
    fn test_entry_without_keys_is_rejected() {
        assert_eq!(
            ParameterEntry::new(None, vec![], ParameterValue::Number(0)).unwrap_err(),
            ParameterError::NoKeys
        );
    }

    #[test]
    fn test_receive_only_entry_does_not_send() {
        let entry =
            ParameterEntry::new(None, vec![ParameterKey::cc(30)], ParameterValue::Number(0))
                .unwrap();
        let mut out = Outbound::new();
        assert!(!entry.send(&ctx().header, &mut out).unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn test_program_change() {
        let mut entry = ParameterEntry::program_change();
        let mut out = Outbound::new();

        assert!(entry
            .parse(&Message::ProgramChange { program: 9 }, &ctx(), &mut out)
            .unwrap());
        assert_eq!(entry.value(), &ParameterValue::Number(9));
    }
}
