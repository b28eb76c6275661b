//! Morph crossfade
//!
//! A morph button press fades the morph parameter from one end of its 14-bit
//! range to the other over the configured fade time, one step per tick.

use tracing::{debug, warn};

use crate::midi::FrameHeader;
use crate::parameter::{EntryHandle, Outbound, ParameterStore, MAX_14BIT};

/// Values above this count as "morphed"
pub const MORPH_HALF_SCALE: i32 = 8191;

pub struct MorphController {
    handle: EntryHandle,
    button: Option<EntryHandle>,
    step: i32,
    target: Option<i32>,
    simulate_bug: bool,
}

impl MorphController {
    /// Create a controller fading the entry at `handle`
    ///
    /// The per-tick step is `16383 / (fade_seconds * 1000 / tick_interval_ms)`.
    pub fn new(handle: EntryHandle, fade_seconds: f64, tick_interval_ms: u64, simulate_bug: bool) -> Self {
        Self {
            handle,
            button: None,
            step: fade_step(fade_seconds, tick_interval_ms),
            target: None,
            simulate_bug,
        }
    }

    /// Entry whose value 1 counts as a button press
    pub fn with_button_entry(mut self, button: EntryHandle) -> Self {
        self.button = Some(button);
        self
    }

    pub fn handle(&self) -> EntryHandle {
        self.handle
    }

    pub fn button_handle(&self) -> Option<EntryHandle> {
        self.button
    }

    pub fn step(&self) -> i32 {
        self.step
    }

    pub fn target(&self) -> Option<i32> {
        self.target
    }

    pub fn is_fading(&self) -> bool {
        self.target.is_some()
    }

    pub fn simulate_bug(&self) -> bool {
        self.simulate_bug
    }

    pub fn set_simulate_bug(&mut self, simulate_bug: bool) {
        self.simulate_bug = simulate_bug;
    }

    /// Start fading towards the opposite end of the range
    pub fn trigger_button_press(&mut self, store: &ParameterStore) {
        if self.simulate_bug {
            debug!("Morph button press ignored (simulated defect)");
            return;
        }

        let current = store.value(self.handle).as_number().unwrap_or(0);
        let target = if current > MORPH_HALF_SCALE { 0 } else { MAX_14BIT };
        debug!("Morph fade {} -> {} (step {})", current, target, self.step);
        self.target = Some(target);
    }

    /// Move one step towards the target and send the new value
    pub fn tick(&mut self, store: &mut ParameterStore, header: &FrameHeader, out: &mut Outbound) {
        let Some(target) = self.target else {
            return;
        };

        let current = store.value(self.handle).as_number().unwrap_or(0);
        if current == target {
            self.target = None;
            return;
        }

        let next = if current < target {
            (current + self.step).min(target)
        } else {
            (current - self.step).max(target)
        };
        store.set_value(self.handle, next);
        if let Err(e) = store.entry(self.handle).send(header, out) {
            warn!("Failed to send morph state: {}", e);
        }

        if next == target {
            debug!("Morph fade reached {}", target);
            self.target = None;
        }
    }
}

fn fade_step(fade_seconds: f64, tick_interval_ms: u64) -> i32 {
    let ticks = fade_seconds * 1000.0 / tick_interval_ms.max(1) as f64;
    if ticks <= 1.0 {
        return MAX_14BIT;
    }
    ((f64::from(MAX_14BIT) / ticks).round() as i32).max(1)
}
