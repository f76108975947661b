//! Interval-based progress logging for record scans.

use log::info;

/// Logs a running count at interval boundaries.
///
/// The reader's iterators are strictly single-threaded, so the counter is a
/// plain integer advanced through `&mut self`.
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: u64,
}

impl ProgressTracker {
    /// Creates a tracker with a default interval of 1,000,000 records.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 1_000_000, message: message.into(), count: 0 }
    }

    /// Overrides the logging interval.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval;
        self
    }

    /// Counts one item and logs when an interval boundary is reached.
    pub fn record_one(&mut self) {
        self.count += 1;
        if self.count.is_multiple_of(self.interval) {
            info!("{} {}", self.message, self.count);
        }
    }

    /// Logs the final count, unless the last `record_one` already did.
    pub fn log_final(&self) {
        if self.count > 0 && !self.count.is_multiple_of(self.interval) {
            info!("{} {} (complete)", self.message, self.count);
        }
    }

    /// The current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }
}
