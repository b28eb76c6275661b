//! Tuner telemetry
//!
//! While running, the note and deviation parameters are sent every 20ms.

use tracing::{debug, warn};

use crate::midi::FrameHeader;
use crate::parameter::{EntryHandle, Outbound, ParameterStore};

/// Interval between tuner updates
pub const TUNER_INTERVAL_MS: u64 = 20;

pub struct TunerController {
    note: EntryHandle,
    deviation: EntryHandle,
    running: bool,
    next_send_ms: Option<u64>,
}

impl TunerController {
    pub fn new(note: EntryHandle, deviation: EntryHandle) -> Self {
        Self {
            note,
            deviation,
            running: false,
            next_send_ms: None,
        }
    }

    pub fn note_handle(&self) -> EntryHandle {
        self.note
    }

    pub fn deviation_handle(&self) -> EntryHandle {
        self.deviation
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        if self.running != running {
            debug!("Tuner {}", if running { "started" } else { "stopped" });
            self.next_send_ms = None;
        }
        self.running = running;
    }

    /// Update the values the tuner reports
    pub fn set_reading(&self, store: &mut ParameterStore, note: i32, deviation: i32) {
        store.set_value(self.note, note);
        store.set_value(self.deviation, deviation);
    }

    pub fn tick(&mut self, now_ms: u64, store: &ParameterStore, header: &FrameHeader, out: &mut Outbound) {
        if !self.running {
            return;
        }
        if let Some(due) = self.next_send_ms {
            if now_ms < due {
                return;
            }
        }
        let mut next = self.next_send_ms.unwrap_or(now_ms) + TUNER_INTERVAL_MS;
        if next <= now_ms {
            next = now_ms + TUNER_INTERVAL_MS;
        }
        self.next_send_ms = Some(next);

        for handle in [self.note, self.deviation] {
            let entry = store.entry(handle);
            if let Err(e) = entry.send(header, out) {
                warn!("Failed to send {}: {}", entry.display_name(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterEntry;

    fn setup() -> (ParameterStore, TunerController) {
        let mut store = ParameterStore::new();
        let note = store.init(ParameterEntry::numeric(0x7D, 0x54)).unwrap();
        let deviation = store.init(ParameterEntry::numeric(0x7C, 0x0F)).unwrap();
        (store, TunerController::new(note, deviation))
    }

    #[test]
    fn test_silent_when_stopped() {
        let (store, mut tuner) = setup();
        let mut out = Outbound::new();
        for now in (0..200).step_by(10) {
            tuner.tick(now, &store, &FrameHeader::new(0x02, 0x7F), &mut out);
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_sends_note_and_deviation_every_20ms() {
        let (mut store, mut tuner) = setup();
        let header = FrameHeader::new(0x02, 0x7F);
        let mut out = Outbound::new();
        tuner.set_reading(&mut store, 45, 8192);
        tuner.set_running(true);

        for now in (0..100).step_by(10) {
            tuner.tick(now, &store, &header, &mut out);
        }

        // Sends at 0, 20, 40, 60, 80
        let frames = out.drain();
        assert_eq!(frames.len(), 10);
        assert_eq!(&frames[0][8..12], &[0x7D, 0x54, 0, 45]);
        assert_eq!(&frames[1][8..12], &[0x7C, 0x0F, 0x40, 0x00]);
    }

    #[test]
    fn test_interval_holds_with_uneven_ticks() {
        let (store, mut tuner) = setup();
        let header = FrameHeader::new(0x02, 0x7F);
        let mut out = Outbound::new();
        tuner.set_running(true);

        // 15ms ticks: one send per 20ms slot, 30 slots in 600ms
        for now in (0..600).step_by(15) {
            tuner.tick(now, &store, &header, &mut out);
        }
        assert_eq!(out.len(), 2 * 30);
    }

    #[test]
    fn test_stall_does_not_burst() {
        let (store, mut tuner) = setup();
        let header = FrameHeader::new(0x02, 0x7F);
        let mut out = Outbound::new();
        tuner.set_running(true);

        tuner.tick(0, &store, &header, &mut out);
        tuner.tick(500, &store, &header, &mut out);
        tuner.tick(505, &store, &header, &mut out);
        assert_eq!(out.len(), 4);
        tuner.tick(520, &store, &header, &mut out);
        assert_eq!(out.len(), 6);
    }
}
