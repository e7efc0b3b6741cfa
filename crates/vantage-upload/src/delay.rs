//! Adaptive delay between upload cycles.
//!
//! The interval grows while cycles fail or find nothing to send, and snaps
//! back to the minimum after one successful delivery so a backlog drains
//! quickly. All cadence values are configuration, not hidden constants.

use std::time::Duration;

/// Upload cadence configuration for one feature.
#[derive(Debug, Clone)]
pub struct UploadPerformance {
    /// Delay before the very first upload cycle.
    pub initial_delay: Duration,
    /// Lower bound for the cycle delay.
    pub min_delay: Duration,
    /// Upper bound for the cycle delay.
    pub max_delay: Duration,
    /// Relative growth applied per backoff step, e.g. `0.1` for +10%.
    pub change_rate: f64,
}

impl Default for UploadPerformance {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            change_rate: 0.1,
        }
    }
}

/// Mutable delay state driven by upload outcomes.
#[derive(Debug, Clone)]
pub struct UploadDelay {
    performance: UploadPerformance,
    current: Duration,
}

impl UploadDelay {
    /// Creates a delay starting at the configured initial value.
    pub fn new(performance: UploadPerformance) -> Self {
        let current = performance.initial_delay;
        Self {
            performance,
            current,
        }
    }

    /// Returns the delay to wait before the next cycle.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grows the delay after a failed or idle cycle, up to the maximum.
    pub fn increase(&mut self) {
        let scaled = self.current.mul_f64(1.0 + self.performance.change_rate);
        self.current = scaled.min(self.performance.max_delay);
    }

    /// Resets the delay to the minimum after a successful cycle, so a
    /// backlog drains at full cadence.
    pub fn reset_to_minimum(&mut self) {
        self.current = self.performance.min_delay;
    }
}
