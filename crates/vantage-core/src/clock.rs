//! Clock abstraction for age-based storage policies.
//!
//! File rotation, read eligibility and obsolescence are all driven by wall
//! clock deltas. Routing them through a trait keeps every policy testable
//! without sleeping in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Provides the current time in milliseconds since the UNIX epoch.
pub trait Clock: Send + Sync {
    /// Returns the current time in milliseconds since the UNIX epoch.
    fn now_millis(&self) -> u64;
}

/// Production clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests.
#[derive(Debug, Default)]
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    /// Creates a mock clock starting at the given millisecond timestamp.
    pub fn new(start_millis: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(start_millis),
        })
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute millisecond timestamp.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
