use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::endpoint::Endpoint;
use crate::statistics::PoolStatistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Register,
    Unregister,
    Subscribe,
    Unsubscribe,
}

impl OperationKind {
    /// The operation that supersedes a pending retry of this kind for the
    /// same target, e.g. an unregister makes a pending register retry moot.
    pub fn inverse(self) -> Self {
        match self {
            Self::Register => Self::Unregister,
            Self::Unregister => Self::Register,
            Self::Subscribe => Self::Unsubscribe,
            Self::Unsubscribe => Self::Subscribe,
        }
    }
}

#[derive(Debug, Clone)]
/// Describes a registry operation without executing it.
///
/// The retry machinery never inspects the operation's semantics, only the
/// success or failure of an attempt.
pub enum OperationDescriptor {
    Register(Endpoint),
    Unregister(Endpoint),
    Subscribe(String),
    Unsubscribe(String),
}

impl OperationDescriptor {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Register(_) => OperationKind::Register,
            Self::Unregister(_) => OperationKind::Unregister,
            Self::Subscribe(_) => OperationKind::Subscribe,
            Self::Unsubscribe(_) => OperationKind::Unsubscribe,
        }
    }

    /// A stable identifier for the operation's target, shared by an
    /// operation and its inverse.
    pub fn target(&self) -> String {
        match self {
            Self::Register(endpoint) | Self::Unregister(endpoint) => {
                endpoint.addr.to_string()
            },
            Self::Subscribe(key) | Self::Unsubscribe(key) => key.clone(),
        }
    }
}

impl Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(endpoint) => write!(f, "register {}", endpoint.addr),
            Self::Unregister(endpoint) => write!(f, "unregister {}", endpoint.addr),
            Self::Subscribe(key) => write!(f, "subscribe {key}"),
            Self::Unsubscribe(key) => write!(f, "unsubscribe {key}"),
        }
    }
}

#[async_trait]
/// Executes a described operation, reporting only success or failure.
pub trait OperationExecutor: Send + Sync + 'static {
    async fn attempt(&self, descriptor: &OperationDescriptor) -> anyhow::Result<()>;
}

/// A failed registry operation awaiting re-attempts at a fixed period.
///
/// Cancellation is cooperative: the flag is checked each time the task
/// fires, an in-flight attempt is never interrupted.
pub struct RetryTask {
    descriptor: OperationDescriptor,
    period: Duration,
    cancelled: AtomicBool,
}

impl RetryTask {
    pub fn new(descriptor: OperationDescriptor, period: Duration) -> Self {
        Self {
            descriptor,
            period,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Suppresses all future firings of this task.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

enum Msg {
    Schedule(Arc<RetryTask>),
    Shutdown,
}

#[derive(Clone)]
/// Drives periodic re-attempts of failed registry operations.
///
/// One scheduler runs per registry instance, owning a min-heap of
/// (fire-time, task) pairs; it suspends only while waiting for the next
/// fire-time or a newly enqueued task. Attempt failures are logged and
/// rescheduled, never propagated — one failing target cannot starve
/// retries for others.
///
/// This handle is cheap to clone.
pub struct RetryScheduler {
    tx: flume::Sender<Msg>,
    stop: Arc<AtomicBool>,
}

impl RetryScheduler {
    /// Spawns the scheduler loop.
    pub fn start(executor: Arc<dyn OperationExecutor>, statistics: PoolStatistics) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = flume::unbounded();

        tokio::spawn(run_scheduler(executor, rx, stop.clone(), statistics));

        Self { tx, stop }
    }

    /// Enqueues a task; its first re-attempt fires one period from now.
    ///
    /// Scheduling against a stopped scheduler silently drops the task.
    pub fn schedule(&self, task: Arc<RetryTask>) {
        if self.stop.load(Ordering::Relaxed) {
            debug!(
                operation = %task.descriptor(),
                "Retry scheduler is stopped, dropping task."
            );
            return;
        }

        let _ = self.tx.send(Msg::Schedule(task));
    }

    /// Stops the scheduler; no task fires after shutdown completes.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.tx.send(Msg::Shutdown);
    }
}

struct QueueEntry {
    fire_at: Instant,
    seq: u64,
    task: Arc<RetryTask>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // Reversed so the BinaryHeap pops the soonest fire-time first.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.fire_at, other.seq).cmp(&(self.fire_at, self.seq))
    }
}

async fn run_scheduler(
    executor: Arc<dyn OperationExecutor>,
    rx: flume::Receiver<Msg>,
    stop: Arc<AtomicBool>,
    statistics: PoolStatistics,
) {
    let mut queue = BinaryHeap::<QueueEntry>::new();
    let mut seq = 0u64;

    loop {
        let next_fire = queue.peek().map(|entry| entry.fire_at);

        tokio::select! {
            msg = rx.recv_async() => match msg {
                Ok(Msg::Schedule(task)) => {
                    statistics
                        .retries_scheduled
                        .fetch_add(1, Ordering::Relaxed);

                    seq += 1;
                    queue.push(QueueEntry {
                        fire_at: Instant::now() + task.period(),
                        seq,
                        task,
                    });
                },
                Ok(Msg::Shutdown) | Err(_) => break,
            },
            _ = wait_until(next_fire) => {
                let now = Instant::now();
                while queue
                    .peek()
                    .map_or(false, |entry| entry.fire_at <= now)
                {
                    let entry = queue.pop().expect("peeked entry");
                    if let Some(rescheduled) =
                        fire(&executor, &stop, &statistics, entry.task).await
                    {
                        seq += 1;
                        queue.push(QueueEntry {
                            fire_at: Instant::now() + rescheduled.period(),
                            seq,
                            task: rescheduled,
                        });
                    }

                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                }
            },
        }

        if stop.load(Ordering::Relaxed) {
            break;
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Runs one attempt; returns the task again if it should be rescheduled.
async fn fire(
    executor: &Arc<dyn OperationExecutor>,
    stop: &Arc<AtomicBool>,
    statistics: &PoolStatistics,
    task: Arc<RetryTask>,
) -> Option<Arc<RetryTask>> {
    // Cancelled tasks and stopped schedulers drop the firing silently.
    if stop.load(Ordering::Relaxed) {
        return None;
    }
    if task.is_cancelled() {
        debug!(operation = %task.descriptor(), "Retry task was cancelled.");
        return None;
    }

    match executor.attempt(task.descriptor()).await {
        Ok(()) => {
            statistics.retries_succeeded.fetch_add(1, Ordering::Relaxed);
            info!(
                operation = %task.descriptor(),
                "Registry operation succeeded on retry."
            );
            None
        },
        Err(e) => {
            statistics
                .retry_attempts_failed
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                error = ?e,
                operation = %task.descriptor(),
                period = ?task.period(),
                "Registry operation failed again, waiting for next retry."
            );
            Some(task)
        },
    }
}
