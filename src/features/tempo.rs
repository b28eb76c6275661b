//! Tempo clock and tap tempo
//!
//! The tempo is kept as a blink period in milliseconds (`30000 / bpm`). Each
//! time the period elapses the tempo display parameter toggles between 0 and
//! 1 and is sent, like the blinking tempo LED of the real unit.

use tracing::{debug, warn};

use crate::midi::FrameHeader;
use crate::parameter::{EntryHandle, Outbound, ParameterStore};

/// Taps further apart than this start a new sequence
pub const TAP_TIMEOUT_MS: u64 = 3000;

const PERIOD_NUMERATOR_MS: f64 = 30000.0;

/// Callback fired with the new bpm (`None` when cleared)
pub type TempoCallback = Box<dyn FnMut(Option<u32>) + Send>;

pub struct TempoController {
    display: EntryHandle,
    tap: Option<EntryHandle>,
    period_ms: Option<u64>,
    next_toggle_ms: Option<u64>,
    last_tap_ms: Option<u64>,
    listeners: Vec<TempoCallback>,
}

impl TempoController {
    /// Create a controller blinking the entry at `display`
    pub fn new(display: EntryHandle) -> Self {
        Self {
            display,
            tap: None,
            period_ms: None,
            next_toggle_ms: None,
            last_tap_ms: None,
            listeners: Vec::new(),
        }
    }

    /// Entry whose value 1 counts as a tap
    pub fn with_tap_entry(mut self, tap: EntryHandle) -> Self {
        self.tap = Some(tap);
        self
    }

    pub fn display_handle(&self) -> EntryHandle {
        self.display
    }

    pub fn tap_handle(&self) -> Option<EntryHandle> {
        self.tap
    }

    pub fn period_ms(&self) -> Option<u64> {
        self.period_ms
    }

    /// Current tempo, `None` if no tempo is set
    pub fn bpm(&self) -> Option<u32> {
        self.period_ms
            .map(|period| (PERIOD_NUMERATOR_MS / period as f64).round() as u32)
    }

    /// Register a listener for bpm changes
    pub fn on_change<F>(&mut self, listener: F)
    where
        F: FnMut(Option<u32>) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Set the tempo. Values that round to zero clear it.
    pub fn set_bpm(&mut self, bpm: f64) {
        let rounded = bpm.round();
        if !rounded.is_finite() || rounded < 1.0 {
            self.clear();
            return;
        }
        self.update_period(Some((PERIOD_NUMERATOR_MS / rounded) as u64));
    }

    /// Remove the tempo; the display stops blinking
    pub fn clear(&mut self) {
        self.last_tap_ms = None;
        self.update_period(None);
    }

    /// Feed a tap value; only value 1 counts
    pub fn tap(&mut self, value: i32, now_ms: u64) {
        if value != 1 {
            return;
        }

        let previous = self.last_tap_ms.replace(now_ms);
        match previous {
            Some(previous) if now_ms.saturating_sub(previous) <= TAP_TIMEOUT_MS => {
                let gap = now_ms - previous;
                if gap == 0 {
                    return;
                }
                debug!("Tap gap {}ms", gap);
                self.update_period(Some(gap));
            }
            _ => debug!("Tap sequence started at {}ms", now_ms),
        }
    }

    /// Toggle and send the display parameter once per elapsed period
    ///
    /// The schedule is anchored on the first tick after the tempo changes
    /// and advances by whole periods, so ticks that do not divide the period
    /// do not slow the blink down.
    pub fn tick(&mut self, now_ms: u64, store: &mut ParameterStore, header: &FrameHeader, out: &mut Outbound) {
        let Some(period) = self.period_ms else {
            return;
        };
        let due = *self.next_toggle_ms.get_or_insert(now_ms + period);
        if now_ms < due {
            return;
        }
        let mut next = due + period;
        if next <= now_ms {
            next = now_ms + period;
        }
        self.next_toggle_ms = Some(next);

        let next = match store.value(self.display).as_number() {
            Some(0) | None => 1,
            Some(_) => 0,
        };
        store.set_value(self.display, next);
        if let Err(e) = store.entry(self.display).send(header, out) {
            warn!("Failed to send tempo display: {}", e);
        }
    }

    fn update_period(&mut self, period_ms: Option<u64>) {
        let before = self.bpm();
        let period_ms = period_ms.filter(|p| *p > 0);
        if period_ms != self.period_ms {
            self.next_toggle_ms = None;
        }
        self.period_ms = period_ms;
        let after = self.bpm();
        if before != after {
            debug!("Tempo changed: {:?} -> {:?} bpm", before, after);
            for listener in self.listeners.iter_mut() {
                listener(after);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{ParameterEntry, ParameterValue};
    use std::sync::{Arc, Mutex};

    fn setup() -> (ParameterStore, TempoController) {
        let mut store = ParameterStore::new();
        let display = store.init(ParameterEntry::numeric(0x7C, 0x00)).unwrap();
        (store, TempoController::new(display))
    }

    #[test]
    fn test_set_bpm_period() {
        let (_, mut tempo) = setup();
        tempo.set_bpm(120.0);
        assert_eq!(tempo.period_ms(), Some(250));
        assert_eq!(tempo.bpm(), Some(120));

        tempo.set_bpm(99.6);
        assert_eq!(tempo.bpm(), Some(100));
    }

    #[test]
    fn test_tap_sequence() {
        let (_, mut tempo) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tempo.on_change(move |bpm| sink.lock().unwrap().push(bpm));

        tempo.tap(1, 0);
        tempo.tap(0, 50);
        tempo.tap(1, 500);
        tempo.tap(1, 1000);
        assert_eq!(tempo.bpm(), Some(60));

        // Gap 3500 > 3000: new sequence, bpm unchanged
        tempo.tap(1, 4500);
        assert_eq!(tempo.bpm(), Some(60));

        tempo.tap(1, 5500);
        assert_eq!(tempo.bpm(), Some(30));

        assert_eq!(*seen.lock().unwrap(), vec![Some(60), Some(30)]);
    }

    #[test]
    fn test_clear_notifies() {
        let (_, mut tempo) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        tempo.on_change(move |bpm| sink.lock().unwrap().push(bpm));

        tempo.set_bpm(120.0);
        tempo.set_bpm(120.0);
        tempo.clear();
        assert_eq!(tempo.bpm(), None);
        assert_eq!(*seen.lock().unwrap(), vec![Some(120), None]);
    }

    #[test]
    fn test_tick_toggles_display() {
        let (mut store, mut tempo) = setup();
        let header = FrameHeader::new(0x02, 0x7F);
        let mut out = Outbound::new();
        tempo.set_bpm(120.0);

        let mut values = Vec::new();
        for now in (0..=1000).step_by(10) {
            tempo.tick(now, &mut store, &header, &mut out);
            if let Some(frame) = out.pop() {
                values.push(frame[11]);
            }
        }

        // Toggles at 250, 500, 750, 1000
        assert_eq!(values, vec![1, 0, 1, 0]);
        assert_eq!(store.value(tempo.display_handle()), &ParameterValue::Number(0));
    }

    #[test]
    fn test_blink_keeps_period_with_uneven_ticks() {
        let (mut store, mut tempo) = setup();
        let header = FrameHeader::new(0x02, 0x7F);
        let mut out = Outbound::new();
        tempo.set_bpm(120.0);

        // 20ms ticks do not divide the 250ms period
        for now in (0..=10_000).step_by(20) {
            tempo.tick(now, &mut store, &header, &mut out);
        }
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn test_new_tempo_restarts_schedule() {
        let (mut store, mut tempo) = setup();
        let header = FrameHeader::new(0x02, 0x7F);
        let mut out = Outbound::new();
        tempo.set_bpm(120.0);
        tempo.tick(0, &mut store, &header, &mut out);

        tempo.set_bpm(60.0);
        tempo.tick(100, &mut store, &header, &mut out);
        tempo.tick(250, &mut store, &header, &mut out);
        assert!(out.is_empty());
        tempo.tick(600, &mut store, &header, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_no_tempo_no_blink() {
        let (mut store, mut tempo) = setup();
        let mut out = Outbound::new();
        tempo.tick(10_000, &mut store, &FrameHeader::new(0x02, 0x7F), &mut out);
        assert!(out.is_empty());
    }
}
