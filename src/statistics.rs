use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type Counter = AtomicU64;

#[derive(Debug, Clone, Default)]
/// Live metrics around the address pool pipeline.
pub struct PoolStatistics(Arc<PoolStatisticsInner>);

impl Deref for PoolStatistics {
    type Target = PoolStatisticsInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Default)]
pub struct PoolStatisticsInner {
    /// The number of raw membership events received from the registry.
    pub(crate) notifications_received: Counter,
    /// The number of coalesced membership applications performed.
    pub(crate) notifications_applied: Counter,
    /// The number of scheduled applications skipped because a newer event
    /// superseded them. Superseded runs are by design, not failures.
    pub(crate) notifications_superseded: Counter,
    /// The number of retry tasks handed to the scheduler.
    pub(crate) retries_scheduled: Counter,
    /// The number of retry attempts that failed and were rescheduled.
    pub(crate) retry_attempts_failed: Counter,
    /// The number of retry tasks that completed successfully.
    pub(crate) retries_succeeded: Counter,
}

impl PoolStatisticsInner {
    /// The number of raw membership events received from the registry.
    pub fn notifications_received(&self) -> u64 {
        self.notifications_received.load(Ordering::Relaxed)
    }

    /// The number of coalesced membership applications performed.
    pub fn notifications_applied(&self) -> u64 {
        self.notifications_applied.load(Ordering::Relaxed)
    }

    /// The number of scheduled applications skipped as superseded.
    pub fn notifications_superseded(&self) -> u64 {
        self.notifications_superseded.load(Ordering::Relaxed)
    }

    /// The number of retry tasks handed to the scheduler.
    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    /// The number of retry attempts that failed and were rescheduled.
    pub fn retry_attempts_failed(&self) -> u64 {
        self.retry_attempts_failed.load(Ordering::Relaxed)
    }

    /// The number of retry tasks that completed successfully.
    pub fn retries_succeeded(&self) -> u64 {
        self.retries_succeeded.load(Ordering::Relaxed)
    }
}
