//! Injected clock port.
//!
//! The deterministic pipeline never reads the wall clock directly. The only
//! consumers of time are the policy expiry check and the informational
//! `createdAt` fields of manifests and records, and both take a [`Clock`]
//! so tests can pin it.

use chrono::{DateTime, TimeZone, Utc};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used by the binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests and reproduction runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Builds a fixed clock from a unix timestamp in seconds.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is outside the representable range.
    #[must_use]
    pub fn from_unix(secs: i64) -> Self {
        Self(Utc.timestamp_opt(secs, 0).single().expect("valid unix timestamp"))
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}
