//! Tracking consent lifecycle.
//!
//! Events recorded while consent is undecided are quarantined in an
//! "unauthorized" directory until the host app resolves consent. The
//! provider is the single source of truth for the current value and
//! notifies subscribers of each transition so storage can migrate files.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// User consent for tracking and uploading telemetry data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackingConsent {
    /// Consent not yet resolved; data is written to quarantine storage.
    Pending,
    /// Consent granted; data is written to upload-eligible storage.
    Granted,
    /// Consent denied; new data is dropped and quarantined data is deleted.
    NotGranted,
}

impl fmt::Display for TrackingConsent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingConsent::Pending => write!(f, "pending"),
            TrackingConsent::Granted => write!(f, "granted"),
            TrackingConsent::NotGranted => write!(f, "notGranted"),
        }
    }
}

/// Callback invoked with `(old, new)` on each consent transition.
pub type ConsentSubscriber = Box<dyn Fn(TrackingConsent, TrackingConsent) + Send + Sync>;

struct ConsentState {
    current: TrackingConsent,
    subscribers: Vec<ConsentSubscriber>,
}

/// Thread-safe holder of the current consent value.
///
/// Subscribers are called synchronously, in registration order, while the
/// transition lock is held; a new value set from another thread cannot
/// interleave with an in-flight notification.
#[derive(Clone)]
pub struct ConsentProvider {
    state: Arc<Mutex<ConsentState>>,
}

impl ConsentProvider {
    /// Creates a provider with the given initial consent.
    pub fn new(initial: TrackingConsent) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConsentState {
                current: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Returns the current consent value.
    pub fn current(&self) -> TrackingConsent {
        self.state.lock().current
    }

    /// Changes the consent value and notifies subscribers.
    ///
    /// Setting the same value again is a no-op and does not notify.
    pub fn set(&self, new: TrackingConsent) {
        let mut state = self.state.lock();
        let old = state.current;
        if old == new {
            return;
        }
        state.current = new;
        debug!(old = %old, new = %new, "tracking consent changed");
        for subscriber in &state.subscribers {
            subscriber(old, new);
        }
    }

    /// Registers a subscriber notified of each `(old, new)` transition.
    pub fn subscribe(&self, subscriber: ConsentSubscriber) {
        self.state.lock().subscribers.push(subscriber);
    }
}

impl fmt::Debug for ConsentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsentProvider")
            .field("current", &self.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_initial_value() {
        let provider = ConsentProvider::new(TrackingConsent::Pending);
        assert_eq!(provider.current(), TrackingConsent::Pending);
    }

    #[test]
    fn test_set_notifies_subscribers_with_old_and_new() {
        let provider = ConsentProvider::new(TrackingConsent::Pending);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        provider.subscribe(Box::new(move |old, new| {
            seen_clone.lock().push((old, new));
        }));

        provider.set(TrackingConsent::Granted);
        provider.set(TrackingConsent::NotGranted);

        let transitions = seen.lock().clone();
        assert_eq!(
            transitions,
            vec![
                (TrackingConsent::Pending, TrackingConsent::Granted),
                (TrackingConsent::Granted, TrackingConsent::NotGranted),
            ]
        );
    }

    #[test]
    fn test_setting_same_value_does_not_notify() {
        let provider = ConsentProvider::new(TrackingConsent::Granted);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        provider.subscribe(Box::new(move |_, _| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        provider.set(TrackingConsent::Granted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let provider = ConsentProvider::new(TrackingConsent::Pending);
        let clone = provider.clone();
        clone.set(TrackingConsent::Granted);
        assert_eq!(provider.current(), TrackingConsent::Granted);
    }

    #[test]
    fn test_display() {
        assert_eq!(TrackingConsent::Pending.to_string(), "pending");
        assert_eq!(TrackingConsent::Granted.to_string(), "granted");
        assert_eq!(TrackingConsent::NotGranted.to_string(), "notGranted");
    }
}
