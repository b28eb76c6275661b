//! Bidirectional session protocol
//!
//! The host opens and renews a session with a beacon frame carrying a
//! parameter set, flags and a time lease (in 2000ms units). While the session
//! is connected the device emits a keep-alive frame every 500ms with a 7-bit
//! rolling counter. The session drops back to offline once the lease expires.
//!
//! ```text
//!            beacon                      tick, now > deadline
//! Offline ─────────────▶ Connected ─────────────────────────▶ Offline
//!                        │    ▲
//!                        └────┘ beacon (renew) / tick (keep-alive)
//! ```

use tracing::{debug, info, warn};

use crate::error::ProtocolError;
use crate::midi::{function, FrameHeader, Message};
use crate::parameter::{Outbound, ParameterStore};

/// Lease unit of the beacon frame
pub const LEASE_UNIT_MS: u64 = 2000;
/// Interval between keep-alive frames
pub const KEEP_ALIVE_INTERVAL_MS: u64 = 500;

/// Beacon address (function 0x7E)
pub const BEACON_ADDRESS: (u8, u8) = (0x40, 0x02);
/// Keep-alive address (function 0x7E)
pub const KEEP_ALIVE_ADDRESS: (u8, u8) = (0x7F, 0x7F);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Offline,
    Connected,
}

/// Flags byte of the beacon frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandshakeFlags {
    /// Push the requested parameter set
    pub init: bool,
    /// Host prefers SysEx over NRPN
    pub sysex: bool,
    /// Echo set frames back
    pub echo: bool,
    /// Host does not want active sensing
    pub nofe: bool,
    /// Tuner mode
    pub tune: bool,
}

impl HandshakeFlags {
    const INIT: u8 = 1 << 0;
    const SYSEX: u8 = 1 << 1;
    const ECHO: u8 = 1 << 2;
    const NOFE: u8 = 1 << 3;
    const TUNE: u8 = 1 << 5;

    pub fn from_byte(byte: u8) -> Self {
        Self {
            init: byte & Self::INIT != 0,
            sysex: byte & Self::SYSEX != 0,
            echo: byte & Self::ECHO != 0,
            nofe: byte & Self::NOFE != 0,
            tune: byte & Self::TUNE != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        let mut byte = 0;
        for (set, bit) in [
            (self.init, Self::INIT),
            (self.sysex, Self::SYSEX),
            (self.echo, Self::ECHO),
            (self.nofe, Self::NOFE),
            (self.tune, Self::TUNE),
        ] {
            if set {
                byte |= bit;
            }
        }
        byte
    }
}

/// Decoded beacon frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub parameter_set: u8,
    pub flags: HandshakeFlags,
    pub lease_units: u8,
}

impl Handshake {
    /// Extract a beacon from a decoded message
    ///
    /// `Ok(None)` if the message is not a beacon at all, `Err` if it is one
    /// with the wrong payload length.
    pub fn from_message(message: &Message) -> Result<Option<Self>, ProtocolError> {
        let Message::Sysex {
            function,
            address_hi,
            address_lo,
            payload,
            ..
        } = message
        else {
            return Ok(None);
        };
        if *function != function::BIDIRECTIONAL || (*address_hi, *address_lo) != BEACON_ADDRESS {
            return Ok(None);
        }

        match payload.as_slice() {
            [parameter_set, flags, lease_units] => Ok(Some(Handshake {
                parameter_set: *parameter_set,
                flags: HandshakeFlags::from_byte(*flags),
                lease_units: *lease_units,
            })),
            _ => Err(ProtocolError::malformed(format!(
                "beacon needs 3 payload bytes, got {}",
                payload.len()
            ))),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::Sysex {
            function: function::BIDIRECTIONAL,
            instance: 0x00,
            address_hi: BEACON_ADDRESS.0,
            address_lo: BEACON_ADDRESS.1,
            payload: vec![self.parameter_set, self.flags.to_byte(), self.lease_units],
        }
    }
}

/// Keep-alive frame carrying `counter`
pub fn keep_alive_message(counter: u8) -> Message {
    Message::Sysex {
        function: function::BIDIRECTIONAL,
        instance: 0x00,
        address_hi: KEEP_ALIVE_ADDRESS.0,
        address_lo: KEEP_ALIVE_ADDRESS.1,
        payload: vec![counter & 0x7F],
    }
}

/// Session handshake state machine
#[derive(Debug, Clone, Default)]
pub struct ProtocolStateMachine {
    state: ConnectionState,
    current_parameter_set: u8,
    flags: HandshakeFlags,
    last_handshake_ms: u64,
    lease_deadline_ms: u64,
    keep_alive_counter: u8,
    next_keep_alive_ms: u64,
}

impl ProtocolStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn current_parameter_set(&self) -> u8 {
        self.current_parameter_set
    }

    pub fn tune_mode(&self) -> bool {
        self.flags.tune
    }

    pub fn echo(&self) -> bool {
        self.flags.echo
    }

    pub fn flags(&self) -> HandshakeFlags {
        self.flags
    }

    pub fn keep_alive_counter(&self) -> u8 {
        self.keep_alive_counter
    }

    pub fn lease_deadline_ms(&self) -> u64 {
        self.lease_deadline_ms
    }

    pub fn last_handshake_ms(&self) -> u64 {
        self.last_handshake_ms
    }

    /// Consume a beacon frame
    ///
    /// Returns the decoded handshake if the message was a beacon. With the
    /// `init` flag set, every entry of the requested parameter set is pushed
    /// in registration order.
    pub fn parse(
        &mut self,
        message: &Message,
        now_ms: u64,
        store: &ParameterStore,
        header: &FrameHeader,
        out: &mut Outbound,
    ) -> Result<Option<Handshake>, ProtocolError> {
        let Some(handshake) = Handshake::from_message(message)? else {
            return Ok(None);
        };

        let lease_ms = u64::from(handshake.lease_units) * LEASE_UNIT_MS;
        self.last_handshake_ms = now_ms;
        self.lease_deadline_ms = now_ms + lease_ms;
        self.current_parameter_set = handshake.parameter_set;
        self.flags = handshake.flags;

        match self.state {
            ConnectionState::Offline => {
                info!(
                    "Session connected (set {}, lease {}ms, flags {:02X})",
                    handshake.parameter_set,
                    lease_ms,
                    handshake.flags.to_byte()
                );
                self.state = ConnectionState::Connected;
                self.next_keep_alive_ms = now_ms + KEEP_ALIVE_INTERVAL_MS;
            }
            ConnectionState::Connected => {
                debug!("Session lease renewed until {}ms", self.lease_deadline_ms);
            }
        }

        if handshake.flags.init {
            self.push_parameter_set(handshake.parameter_set, store, header, out);
        }

        Ok(Some(handshake))
    }

    fn push_parameter_set(
        &self,
        set: u8,
        store: &ParameterStore,
        header: &FrameHeader,
        out: &mut Outbound,
    ) {
        let mut pushed = 0;
        for entry in store.entries_in_set(set) {
            match entry.send(header, out) {
                Ok(true) => pushed += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to push {}: {}", entry.display_name(), e),
            }
        }
        debug!("Pushed {} parameters of set {}", pushed, set);
    }

    /// Expire the lease or emit a keep-alive
    pub fn tick(&mut self, now_ms: u64, header: &FrameHeader, out: &mut Outbound) {
        if self.state != ConnectionState::Connected {
            return;
        }

        if now_ms > self.lease_deadline_ms {
            info!(
                "Session lease expired at {}ms (deadline {}ms)",
                now_ms, self.lease_deadline_ms
            );
            self.state = ConnectionState::Offline;
            self.keep_alive_counter = 0;
            return;
        }

        if now_ms >= self.next_keep_alive_ms {
            out.push(keep_alive_message(self.keep_alive_counter).encode(header));
            self.keep_alive_counter = (self.keep_alive_counter + 1) % 128;
            self.next_keep_alive_ms += KEEP_ALIVE_INTERVAL_MS;
            if self.next_keep_alive_ms <= now_ms {
                self.next_keep_alive_ms = now_ms + KEEP_ALIVE_INTERVAL_MS;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterEntry;

    fn header() -> FrameHeader {
        FrameHeader::new(0x02, 0x7F)
    }

    fn beacon(set: u8, flags: u8, lease: u8) -> Message {
        Handshake {
            parameter_set: set,
            flags: HandshakeFlags::from_byte(flags),
            lease_units: lease,
        }
        .to_message()
    }

    fn connect(sm: &mut ProtocolStateMachine, now: u64, lease: u8, out: &mut Outbound) {
        let store = ParameterStore::new();
        sm.parse(&beacon(1, 0, lease), now, &store, &header(), out)
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_flags_bits() {
        let flags = HandshakeFlags::from_byte(0b0010_0001);
        assert!(flags.init);
        assert!(flags.tune);
        assert!(!flags.echo);
        assert_eq!(flags.to_byte(), 0b0010_0001);
    }

    #[test]
    fn test_beacon_wire_format() {
        assert_eq!(
            beacon(2, 0x01, 5).encode(&header()),
            vec![0xF0, 0x00, 0x20, 0x33, 0x02, 0x7F, 0x7E, 0x00, 0x40, 0x02, 0x02, 0x01, 0x05, 0xF7]
        );
    }

    #[test]
    fn test_beacon_with_wrong_length_is_malformed() {
        let message = Message::Sysex {
            function: function::BIDIRECTIONAL,
            instance: 0,
            address_hi: 0x40,
            address_lo: 0x02,
            payload: vec![1, 1],
        };
        assert!(Handshake::from_message(&message).is_err());
    }

    #[test]
    fn test_starts_offline_and_silent() {
        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();

        for now in (0..5000).step_by(20) {
            sm.tick(now, &header(), &mut out);
        }
        assert_eq!(sm.state(), ConnectionState::Offline);
        assert!(out.is_empty());
    }

    #[test]
    fn test_lease_expires_after_deadline_not_before() {
        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();
        connect(&mut sm, 1000, 3, &mut out);

        sm.tick(7000, &header(), &mut out);
        assert!(sm.is_connected());

        sm.tick(7001, &header(), &mut out);
        assert_eq!(sm.state(), ConnectionState::Offline);
        assert_eq!(sm.keep_alive_counter(), 0);
    }

    #[test]
    fn test_renewal_extends_lease() {
        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();
        connect(&mut sm, 0, 1, &mut out);
        connect(&mut sm, 1500, 1, &mut out);

        sm.tick(3000, &header(), &mut out);
        assert!(sm.is_connected());
        sm.tick(3501, &header(), &mut out);
        assert!(!sm.is_connected());
    }

    #[test]
    fn test_keep_alive_counter_wraps_without_gaps() {
        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();
        connect(&mut sm, 0, 127, &mut out);

        let mut now = 0;
        while out.len() < 300 {
            now += 20;
            sm.tick(now, &header(), &mut out);
        }

        let counters: Vec<u8> = out.drain().iter().map(|frame| frame[10]).collect();
        for (i, counter) in counters.iter().enumerate() {
            assert_eq!(*counter as usize, i % 128);
        }
    }

    #[test]
    fn test_keep_alive_interval() {
        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();
        connect(&mut sm, 0, 10, &mut out);

        sm.tick(499, &header(), &mut out);
        assert!(out.is_empty());
        sm.tick(500, &header(), &mut out);
        assert_eq!(
            out.pop().unwrap(),
            vec![0xF0, 0x00, 0x20, 0x33, 0x02, 0x7F, 0x7E, 0x00, 0x7F, 0x7F, 0x00, 0xF7]
        );
        sm.tick(700, &header(), &mut out);
        assert!(out.is_empty());
        sm.tick(1000, &header(), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_init_pushes_only_requested_set_in_order() {
        let mut store = ParameterStore::new();
        store
            .init(ParameterEntry::numeric(1, 1).in_sets([2]).with_value(11))
            .unwrap();
        store
            .init(ParameterEntry::numeric(1, 2).in_sets([1]).with_value(12))
            .unwrap();
        store
            .init(ParameterEntry::text(0, 1).in_sets([2]).with_value("Clean"))
            .unwrap();

        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();
        sm.parse(&beacon(2, 0x01, 5), 0, &store, &header(), &mut out)
            .unwrap();

        let frames = out.drain();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][8..12], &[1, 1, 0, 11]);
        assert_eq!(&frames[1][8..10], &[0, 1]);
        assert_eq!(sm.current_parameter_set(), 2);

        // Renewal without init does not push again
        sm.parse(&beacon(2, 0x00, 5), 100, &store, &header(), &mut out)
            .unwrap();
        assert!(out.is_empty());

        // Init again pushes again
        sm.parse(&beacon(2, 0x01, 5), 200, &store, &header(), &mut out)
            .unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_non_beacon_is_not_consumed() {
        let mut sm = ProtocolStateMachine::new();
        let mut out = Outbound::new();
        let store = ParameterStore::new();
        let message = Message::ControlChange {
            controller: 1,
            value: 1,
        };

        assert_eq!(
            sm.parse(&message, 0, &store, &header(), &mut out).unwrap(),
            None
        );
    }
}
