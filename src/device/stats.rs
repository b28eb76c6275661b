//! Traffic statistics
//!
//! Counts inbound frames by outcome. Unparsed and malformed frames end up
//! here instead of being raised as errors.

use tracing::trace;

use crate::midi::format_hex;

/// Outcome counters for inbound traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    received: u64,
    parsed: u64,
    unparsed: u64,
    malformed: u64,
    last_unparsed: Option<Vec<u8>>,
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_parsed(&mut self) {
        self.parsed += 1;
    }

    /// Frame that no handler consumed
    pub fn record_unparsed(&mut self, data: &[u8]) {
        trace!("Unparsed: {}", format_hex(data));
        self.unparsed += 1;
        self.last_unparsed = Some(data.to_vec());
    }

    /// Candidate frame that failed length/terminator checks
    pub fn record_malformed(&mut self, data: &[u8]) {
        self.malformed += 1;
        self.last_unparsed = Some(data.to_vec());
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn parsed(&self) -> u64 {
        self.parsed
    }

    pub fn unparsed(&self) -> u64 {
        self.unparsed
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Most recent frame that was unparsed or malformed
    pub fn last_unparsed(&self) -> Option<&[u8]> {
        self.last_unparsed.as_deref()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
