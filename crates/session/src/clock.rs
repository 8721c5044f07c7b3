//! Wall-clock time source

use std::fmt;
use tokio::time::Instant;

/// Source of wall-clock time in unix milliseconds
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> i64;
}

/// Wall-clock anchored once and advanced with the tokio clock
///
/// Advancing through `tokio::time` keeps expiry math consistent with the
/// timers that act on it, including under a paused test runtime.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    origin_ms: i64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::starting_at(chrono::Utc::now().timestamp_millis())
    }

    pub fn starting_at(origin_ms: i64) -> Self {
        Self {
            origin: Instant::now(),
            origin_ms,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        let elapsed = i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.origin_ms.saturating_add(elapsed)
    }
}
