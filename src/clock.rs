//! Time sources
//!
//! The device never reads the wall clock directly. Everything that depends on
//! time compares `now_ms()` of an injected source against stored deadlines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonically non-decreasing millisecond clock
pub trait TimeSource: Send {
    fn now_ms(&self) -> u64;
}

/// Real clock, milliseconds since construction
#[derive(Debug, Clone)]
pub struct SystemClock {
    start_instant: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start_instant: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }
}

/// Test clock with manually controlled time
///
/// Clones share the same time value, so a test can keep one handle and give
/// another to the device.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Set the current time. Never moves backwards.
    pub fn set(&self, ms: u64) {
        self.now_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Advance the current time by `ms`
    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::Relaxed);
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}
