//! VirtualDevice - the simulated unit
//!
//! Owns the parameter store, the session protocol and the feature
//! controllers. The host feeds inbound frames to `receive()`, calls `tick()`
//! at a steady interval and drains the outbound queue. Nothing here blocks or
//! spawns; all timing comes from the injected `TimeSource`.

mod stats;


pub use stats::DeviceStats;

use tracing::{debug, trace, warn};

use crate::clock::{SystemClock, TimeSource};
use crate::config::DeviceConfig;
use crate::error::{ParameterError, Result};
use crate::features::{MorphController, TempoController, TunerController};
use crate::midi::{format_hex, FrameHeader, Message};
use crate::parameter::{
    EntryHandle, Outbound, ParameterEntry, ParameterStore, ParameterValue, ParseContext,
};
use crate::preset;
use crate::protocol::ProtocolStateMachine;

pub struct VirtualDevice {
    config: DeviceConfig,
    header: FrameHeader,
    clock: Box<dyn TimeSource>,
    store: ParameterStore,
    protocol: ProtocolStateMachine,
    morph: MorphController,
    tempo: TempoController,
    tuner: TunerController,
    outbound: Outbound,
    stats: DeviceStats,
}

impl VirtualDevice {
    /// Create a device on the wall clock
    pub fn new(config: DeviceConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock::new())
    }

    /// Create a device on an injected clock
    pub fn with_clock(config: DeviceConfig, clock: impl TimeSource + 'static) -> Result<Self> {
        let header = config.header();
        let mut store = ParameterStore::new();
        let handles = preset::register(&mut store)?;

        let morph = MorphController::new(
            handles.morph_state,
            config.morph_fade_seconds,
            config.tick_interval_ms,
            config.simulate_morph_bug,
        )
        .with_button_entry(handles.morph_button);

        let mut tempo = TempoController::new(handles.tempo_display).with_tap_entry(handles.tap_tempo);
        tempo.set_bpm(config.default_bpm);

        let tuner = TunerController::new(handles.tuner_note, handles.tuner_deviation);

        debug!(
            "Virtual device ready: product type {:02X}, device id {:02X}, {} parameters",
            header.product_type,
            header.device_id,
            store.len()
        );

        Ok(Self {
            config,
            header,
            clock: Box::new(clock),
            store,
            protocol: ProtocolStateMachine::new(),
            morph,
            tempo,
            tuner,
            outbound: Outbound::new(),
            stats: DeviceStats::new(),
        })
    }

    /// Feed one inbound frame
    ///
    /// Returns `true` if the session protocol or a parameter consumed it.
    /// Malformed and unmatched frames are recorded in the stats.
    pub fn receive(&mut self, data: &[u8]) -> bool {
        self.stats.record_received();
        let now = self.clock.now_ms();
        trace!("IN  {}", format_hex(data));

        let message = match Message::parse(data, &self.header) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Ignoring frame not addressed to us: {}", format_hex(data));
                self.stats.record_unparsed(data);
                return false;
            }
            Err(e) => {
                warn!("{} ({})", e, format_hex(data));
                self.stats.record_malformed(data);
                return false;
            }
        };

        let was_tuning = self.protocol.tune_mode();
        match self
            .protocol
            .parse(&message, now, &self.store, &self.header, &mut self.outbound)
        {
            Ok(Some(handshake)) => {
                if handshake.flags.tune != was_tuning {
                    self.tuner.set_running(handshake.flags.tune);
                }
                self.stats.record_parsed();
                return true;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("{} ({})", e, format_hex(data));
                self.stats.record_malformed(data);
                return false;
            }
        }

        let ctx = ParseContext {
            header: self.header,
            echo: self.protocol.is_connected() && self.protocol.echo(),
        };
        match self.store.parse(&message, &ctx, &mut self.outbound) {
            Ok(dispatch) => match dispatch.handle() {
                Some(handle) => {
                    self.route(handle, now);
                    self.stats.record_parsed();
                    true
                }
                None => {
                    debug!("Unparsed: {}", message);
                    self.stats.record_unparsed(data);
                    false
                }
            },
            Err(e) => {
                warn!("{} ({})", e, format_hex(data));
                self.stats.record_malformed(data);
                false
            }
        }
    }

    /// Hand control inputs to the controllers listening on them
    fn route(&mut self, handle: EntryHandle, now: u64) {
        let value = self.store.value(handle).as_number();

        if self.tempo.tap_handle() == Some(handle) {
            if let Some(value) = value {
                self.tempo.tap(value, now);
            }
        }
        if self.morph.button_handle() == Some(handle) && value == Some(1) {
            self.morph.trigger_button_press(&self.store);
        }
    }

    /// Advance the protocol, morph, tempo and tuner, in that order
    ///
    /// Unsolicited feature traffic only reaches the outbound queue while a
    /// session is connected; offline the controllers still advance.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        self.protocol.tick(now, &self.header, &mut self.outbound);

        let mut muted = Outbound::new();
        let out = if self.protocol.is_connected() {
            &mut self.outbound
        } else {
            &mut muted
        };

        self.morph.tick(&mut self.store, &self.header, out);
        self.tempo.tick(now, &mut self.store, &self.header, out);
        self.tuner.tick(now, &self.store, &self.header, out);
    }

    /// Send a parameter's current value explicitly
    pub fn send(&mut self, handle: EntryHandle) -> Result<bool, ParameterError> {
        self.store.entry(handle).send(&self.header, &mut self.outbound)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn pop_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop()
    }

    /// Take every queued outbound frame in FIFO order
    pub fn drain_outbound(&mut self) -> Vec<Vec<u8>> {
        self.outbound.drain()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Total number of frames ever queued for the host
    pub fn sent_count(&self) -> u64 {
        self.outbound.sent_count()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn header(&self) -> FrameHeader {
        self.header
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    /// Register an additional parameter next to the standard layout
    pub fn register(&mut self, entry: ParameterEntry) -> Result<EntryHandle, ParameterError> {
        self.store.init(entry)
    }

    /// Change a parameter's value without sending it
    pub fn set_value(&mut self, handle: EntryHandle, value: impl Into<ParameterValue>) {
        self.store.set_value(handle, value);
    }

    /// Drop every entry (including auto-created ones) and re-register the
    /// standard layout
    pub fn reset_parameters(&mut self) -> Result<()> {
        self.store.clear();
        let handles = preset::register(&mut self.store)?;
        debug_assert_eq!(handles.morph_state, self.morph.handle());
        debug_assert_eq!(Some(handles.tap_tempo), self.tempo.tap_handle());
        Ok(())
    }

    pub fn protocol(&self) -> &ProtocolStateMachine {
        &self.protocol
    }

    pub fn morph(&self) -> &MorphController {
        &self.morph
    }

    pub fn morph_mut(&mut self) -> &mut MorphController {
        &mut self.morph
    }

    pub fn trigger_morph(&mut self) {
        self.morph.trigger_button_press(&self.store);
    }

    pub fn tempo(&self) -> &TempoController {
        &self.tempo
    }

    pub fn tempo_mut(&mut self) -> &mut TempoController {
        &mut self.tempo
    }

    pub fn tap(&mut self) {
        let now = self.clock.now_ms();
        self.tempo.tap(1, now);
    }

    pub fn tuner(&self) -> &TunerController {
        &self.tuner
    }

    pub fn tuner_mut(&mut self) -> &mut TunerController {
        &mut self.tuner
    }

    pub fn set_tuner_reading(&mut self, note: i32, deviation: i32) {
        self.tuner.set_reading(&mut self.store, note, deviation);
    }

    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }
}
