//! Ledger Clock
//!
//! Single source of "current time" for market creation, staking and
//! settlement. Components receive a clock explicitly and never read
//! system time on their own.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::market::UnixSecs;

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now_unix_secs(&self) -> UnixSecs;
}

/// Wall clock backed by the system UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_secs(&self) -> UnixSecs {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock for tests and offline replays.
///
/// # Determinism Contract
/// - `now_unix_secs()` returns exactly what was last set
/// - `advance_to()` only moves forward
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicI64,
}

impl ManualClock {
    pub fn new(start: UnixSecs) -> Self {
        Self {
            current: AtomicI64::new(start),
        }
    }

    /// Move the clock to `new_time`. Panics in debug builds if time would go backward.
    pub fn advance_to(&self, new_time: UnixSecs) {
        let previous = self.current.swap(new_time, Ordering::SeqCst);
        debug_assert!(
            new_time >= previous,
            "ManualClock: cannot go backward from {} to {}",
            previous,
            new_time
        );
    }

    /// Advance by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        debug_assert!(secs >= 0, "ManualClock: negative advance {}", secs);
        self.current.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix_secs(&self) -> UnixSecs {
        self.current.load(Ordering::SeqCst)
    }
}
