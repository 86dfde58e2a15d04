use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::endpoint::Endpoint;
use crate::notifier::{MembershipListener, NotificationCoalescer};
use crate::retry::{
    OperationDescriptor,
    OperationExecutor,
    OperationKind,
    RetryScheduler,
    RetryTask,
};
use crate::statistics::PoolStatistics;

#[async_trait]
/// The abstract "perform registry operation" primitive.
///
/// Implementations talk to a concrete registry (Zookeeper, Nacos, DNS, an
/// in-memory fake); every operation is fallible and the failure is treated
/// as transient. Raw membership pushes from the backend are fed back through
/// [`Registry::notify_raw`].
pub trait RegistryBackend: Send + Sync + 'static {
    async fn register(&self, endpoint: &Endpoint) -> anyhow::Result<()>;

    async fn unregister(&self, endpoint: &Endpoint) -> anyhow::Result<()>;

    async fn subscribe(&self, key: &str) -> anyhow::Result<()>;

    async fn unsubscribe(&self, key: &str) -> anyhow::Result<()>;
}

type PendingKey = (OperationKind, String);

struct RegistryInner {
    backend: Arc<dyn RegistryBackend>,
    config: RegistryConfig,
    /// Retry tasks still awaiting success, keyed by operation kind and
    /// target so a superseding operation can cancel them.
    pending: Mutex<HashMap<PendingKey, Arc<RetryTask>>>,
    stopped: AtomicBool,
    statistics: PoolStatistics,
}

impl RegistryInner {
    async fn execute(&self, descriptor: &OperationDescriptor) -> anyhow::Result<()> {
        match descriptor {
            OperationDescriptor::Register(endpoint) => {
                self.backend.register(endpoint).await
            },
            OperationDescriptor::Unregister(endpoint) => {
                self.backend.unregister(endpoint).await
            },
            OperationDescriptor::Subscribe(key) => self.backend.subscribe(key).await,
            OperationDescriptor::Unsubscribe(key) => self.backend.unsubscribe(key).await,
        }
    }

    fn cancel_pending(&self, key: &PendingKey) {
        if let Some(task) = self.pending.lock().remove(key) {
            task.cancel();
            debug!(
                operation = %task.descriptor(),
                "Cancelled superseded retry task."
            );
        }
    }
}

/// Executor handed to the retry scheduler; a successful re-attempt also
/// clears the operation from the pending map.
struct FailbackExecutor {
    inner: Arc<RegistryInner>,
}

#[async_trait]
impl OperationExecutor for FailbackExecutor {
    async fn attempt(&self, descriptor: &OperationDescriptor) -> anyhow::Result<()> {
        self.inner.execute(descriptor).await?;
        self.inner
            .pending
            .lock()
            .remove(&(descriptor.kind(), descriptor.target()));
        Ok(())
    }
}

/// A failback front over a [`RegistryBackend`].
///
/// Register/unregister/subscribe/unsubscribe are best-effort from the
/// caller's perspective: each is attempted once inline and, on failure,
/// logged and handed to the retry scheduler rather than surfaced. A later
/// inverse operation for the same target cancels the pending retry it
/// supersedes.
///
/// The registry also owns the notification path: raw membership pushes
/// entering through [`Registry::notify_raw`] are debounced per subscription
/// key and delivered to the subscribed listener as full snapshots.
pub struct Registry {
    inner: Arc<RegistryInner>,
    scheduler: RetryScheduler,
    coalescer: NotificationCoalescer,
}

impl Registry {
    pub fn new(backend: Arc<dyn RegistryBackend>, config: RegistryConfig) -> Self {
        let statistics = PoolStatistics::default();
        let coalescer =
            NotificationCoalescer::new(config.notify_delay, statistics.clone());

        let inner = Arc::new(RegistryInner {
            backend,
            config,
            pending: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            statistics: statistics.clone(),
        });

        let executor = Arc::new(FailbackExecutor {
            inner: inner.clone(),
        });
        let scheduler = RetryScheduler::start(executor, statistics);

        Self {
            inner,
            scheduler,
            coalescer,
        }
    }

    /// Registers an endpoint with the backend, retrying on failure.
    pub async fn register(&self, endpoint: Endpoint) {
        self.apply(OperationDescriptor::Register(endpoint)).await;
    }

    /// Unregisters an endpoint, cancelling any pending register retry for
    /// the same address.
    pub async fn unregister(&self, endpoint: Endpoint) {
        self.apply(OperationDescriptor::Unregister(endpoint)).await;
    }

    /// Subscribes `listener` to membership changes for `key` and asks the
    /// backend to start pushing them.
    ///
    /// The listener is wired into the coalescer before the backend call so
    /// no push is lost even if the backend delivers immediately.
    pub async fn subscribe(
        &self,
        key: impl Into<String>,
        listener: Arc<dyn MembershipListener>,
    ) {
        let key = key.into();
        self.coalescer.subscribe(key.clone(), listener);
        self.apply(OperationDescriptor::Subscribe(key)).await;
    }

    /// Drops the subscription for `key`, cancelling any pending subscribe
    /// retry for it.
    pub async fn unsubscribe(&self, key: impl Into<String>) {
        let key = key.into();
        self.coalescer.unsubscribe(&key);
        self.apply(OperationDescriptor::Unsubscribe(key)).await;
    }

    /// Entry point for raw membership pushes from the backend.
    ///
    /// `endpoints` must be the full current member list for `key`, not a
    /// diff.
    pub fn notify_raw(&self, key: &str, endpoints: Vec<Endpoint>) {
        if self.inner.stopped.load(Ordering::Relaxed) {
            return;
        }
        self.coalescer.on_raw_event(key, endpoints);
    }

    #[inline]
    /// Live counters for the notification and retry pipelines.
    pub fn statistics(&self) -> PoolStatistics {
        self.inner.statistics.clone()
    }

    /// Stops the registry: cancels all outstanding retry tasks and stops
    /// the coalescer and scheduler. Idempotent; nothing fires afterwards.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::Relaxed) {
            return;
        }

        let pending = {
            let mut pending = self.inner.pending.lock();
            std::mem::take(&mut *pending)
        };
        for task in pending.values() {
            task.cancel();
        }

        self.scheduler.shutdown();
        self.coalescer.stop();

        info!(
            num_cancelled = pending.len(),
            "Registry shut down, outstanding retries cancelled."
        );
    }

    async fn apply(&self, descriptor: OperationDescriptor) {
        if self.inner.stopped.load(Ordering::Relaxed) {
            warn!(
                operation = %descriptor,
                "Registry is stopped, ignoring operation."
            );
            return;
        }

        // This operation supersedes any pending retry of its inverse for
        // the same target, and replaces a pending duplicate of itself.
        let target = descriptor.target();
        self.inner
            .cancel_pending(&(descriptor.kind().inverse(), target.clone()));
        self.inner.cancel_pending(&(descriptor.kind(), target.clone()));

        match self.inner.execute(&descriptor).await {
            Ok(()) => {
                debug!(operation = %descriptor, "Registry operation succeeded.");
            },
            Err(e) => {
                warn!(
                    error = ?e,
                    operation = %descriptor,
                    period = ?self.inner.config.retry_period,
                    "Registry operation failed, scheduling retries."
                );

                let task = Arc::new(RetryTask::new(
                    descriptor,
                    self.inner.config.retry_period,
                ));
                self.inner
                    .pending
                    .lock()
                    .insert((task.descriptor().kind(), target), task.clone());
                self.scheduler.schedule(task);
            },
        }
    }
}
