#![warn(missing_docs)]

//! Vantage SDK entry point.
//!
//! The host application constructs a [`VantageCore`] with a [`CoreConfig`],
//! registers one [`FeatureConfig`] per data track, and writes events through
//! [`FeatureScope`] handles. Events are durably queued on disk and uploaded
//! in the background; the tracking consent set on the core instance decides
//! whether data is quarantined, upload eligible or dropped.
//!
//! ```no_run
//! use vantage_core::{Event, TrackingConsent};
//! use vantage_sdk::{CoreConfig, FeatureConfig, VantageCore};
//!
//! # async fn example() -> vantage_sdk::SdkResult<()> {
//! let core = VantageCore::new(CoreConfig::new("/var/lib/vantage", "api-key"));
//! core.register_feature(FeatureConfig::new("logs", "https://intake.example.com/logs"))?;
//!
//! core.set_tracking_consent(TrackingConsent::Granted);
//! core.scope("logs").unwrap().write(Event::new(&b"{\"message\":\"hello\"}"[..]));
//!
//! core.stop().await;
//! # Ok(())
//! # }
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub mod config;
pub mod core;
pub mod error;

pub use config::{CoreConfig, FeatureConfig};
pub use error::{SdkError, SdkResult};
pub use self::core::{FeatureScope, VantageCore};

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG`. Opt-in: library code only emits events and never installs a
/// subscriber on its own.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
