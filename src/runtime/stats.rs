//! Runtime counters.

use crate::runtime::raw_task::TaskOutcome;
use crate::types::Outcome;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of task counters returned by
/// [`Runtime::stats`](crate::runtime::Runtime::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Tasks registered since the runtime was built.
    pub spawned: u64,
    /// Tasks that ended `Completed`.
    pub completed: u64,
    /// Tasks that ended `Failed` (error or panic).
    pub failed: u64,
    /// Tasks that ended `Cancelled`.
    pub cancelled: u64,
    /// Tasks registered and not yet terminal.
    pub live: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    spawned: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finish(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            Outcome::Ok(()) => &self.completed,
            Outcome::Err(_) | Outcome::Panicked(_) => &self.failed,
            Outcome::Cancelled(_) => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, live: usize) -> RuntimeStats {
        RuntimeStats {
            spawned: self.spawned.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            live: live as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::CancelReason;

    #[test]
    fn counts_by_outcome() {
        let stats = StatsCounters::default();
        for _ in 0..3 {
            stats.record_spawn();
        }
        stats.record_finish(&Outcome::Ok(()));
        stats.record_finish(&Outcome::Err(Error::user("x")));
        stats.record_finish(&Outcome::Cancelled(CancelReason::timeout()));
        let snapshot = stats.snapshot(0);
        assert_eq!(
            snapshot,
            RuntimeStats {
                spawned: 3,
                completed: 1,
                failed: 1,
                cancelled: 1,
                live: 0,
            }
        );
    }
}
