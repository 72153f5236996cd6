//! Block clock.
//!
//! The state machine never reads wall time. Whoever drives it (the [`Chain`]
//! handle, a scenario runner, a test) asks a [`Clock`] for the timestamp of
//! the next block and stamps it into the world state before applying calls.
//!
//! [`Chain`]: crate::chain::Chain

use crate::types::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of block timestamps
pub trait Clock: Send + Sync {
    /// Current time in Unix seconds
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp().max(0) as Timestamp
    }
}

/// Manually advanced clock for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    time: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            time: AtomicU64::new(start),
        }
    }

    /// Move time forward by `seconds`, returning the new time
    pub fn advance(&self, seconds: u64) -> Timestamp {
        self.time.fetch_add(seconds, Ordering::SeqCst) + seconds
    }

    /// Jump to an absolute time. Moving backwards is ignored.
    pub fn set(&self, time: Timestamp) {
        self.time.fetch_max(time, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.time.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(7 * 24 * 3600), 1_000 + 604_800);
        clock.set(10);
        assert_eq!(clock.now(), 605_800);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
