//! Time source abstraction.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// A source of the current time.
///
/// The registry never reads the system clock directly so that expiry
/// boundaries can be tested exactly.
pub trait Clock: Send + Sync {
    /// Current Unix time in milliseconds.
    fn now(&self) -> Timestamp;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        system_now_millis()
    }
}

/// Get current time in milliseconds.
///
/// A clock set before the epoch reads as zero.
pub(crate) fn system_now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
