use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use rudder::{Endpoint, Registry, RegistryBackend, RegistryConfig};

const PERIOD: Duration = Duration::from_millis(100);

/// Backend whose register calls fail a configured number of times before
/// succeeding; everything else succeeds immediately.
struct FlakyBackend {
    failures_left: AtomicU64,
    register_attempts: AtomicU64,
}

impl FlakyBackend {
    fn failing(times: u64) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicU64::new(times),
            register_attempts: AtomicU64::new(0),
        })
    }

    fn attempts(&self) -> u64 {
        self.register_attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RegistryBackend for FlakyBackend {
    async fn register(&self, endpoint: &Endpoint) -> anyhow::Result<()> {
        self.register_attempts.fetch_add(1, Ordering::Relaxed);

        let left = self.failures_left.load(Ordering::Relaxed);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::Relaxed);
            return Err(anyhow!("registry unavailable for {}", endpoint.addr));
        }
        Ok(())
    }

    async fn unregister(&self, _endpoint: &Endpoint) -> anyhow::Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unsubscribe(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn test_registry(backend: Arc<FlakyBackend>) -> Registry {
    let config = RegistryConfig {
        retry_period: PERIOD,
        ..RegistryConfig::default()
    };
    Registry::new(backend, config)
}

fn endpoint() -> Endpoint {
    let addr: SocketAddr = "10.0.0.1:8000".parse().unwrap();
    Endpoint::new(addr)
}

#[tokio::test(start_paused = true)]
async fn test_register_converges_after_failures() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    // Inline attempt plus the first two retries fail; the third retry
    // succeeds.
    let backend = FlakyBackend::failing(3);
    let registry = test_registry(backend.clone());

    registry.register(endpoint()).await;
    assert_eq!(backend.attempts(), 1);

    // One attempt per period, no earlier.
    tokio::time::sleep(PERIOD / 2).await;
    assert_eq!(backend.attempts(), 1);

    tokio::time::sleep(PERIOD).await;
    assert_eq!(backend.attempts(), 2);

    tokio::time::sleep(PERIOD).await;
    assert_eq!(backend.attempts(), 3);

    tokio::time::sleep(PERIOD).await;
    assert_eq!(backend.attempts(), 4);

    // Converged; nothing fires any more.
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(backend.attempts(), 4);

    let stats = registry.statistics();
    assert_eq!(stats.retries_scheduled(), 1);
    assert_eq!(stats.retry_attempts_failed(), 2);
    assert_eq!(stats.retries_succeeded(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unregister_cancels_pending_register_retry() -> anyhow::Result<()> {
    // Register never succeeds on its own.
    let backend = FlakyBackend::failing(u64::MAX);
    let registry = test_registry(backend.clone());

    registry.register(endpoint()).await;
    tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;
    assert_eq!(backend.attempts(), 3);

    // The unregister supersedes the pending register retry; later periods
    // must stay silent.
    registry.unregister(endpoint()).await;
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(backend.attempts(), 3);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_outstanding_retries() -> anyhow::Result<()> {
    let backend = FlakyBackend::failing(u64::MAX);
    let registry = test_registry(backend.clone());

    registry.register(endpoint()).await;
    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(backend.attempts(), 2);

    registry.shutdown();
    tokio::time::sleep(PERIOD * 5).await;
    assert_eq!(backend.attempts(), 2);

    // Operations after shutdown are ignored entirely.
    registry.register(endpoint()).await;
    tokio::time::sleep(PERIOD * 2).await;
    assert_eq!(backend.attempts(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_reregister_replaces_pending_retry() -> anyhow::Result<()> {
    let backend = FlakyBackend::failing(u64::MAX);
    let registry = test_registry(backend.clone());

    registry.register(endpoint()).await;
    tokio::time::sleep(PERIOD + PERIOD / 2).await;
    assert_eq!(backend.attempts(), 2);

    // A duplicate register cancels the previous retry task and starts a
    // fresh one; the attempt counter keeps a single cadence rather than
    // doubling up.
    registry.register(endpoint()).await;
    assert_eq!(backend.attempts(), 3);

    tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;
    assert_eq!(backend.attempts(), 5);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_successful_operations_schedule_nothing() -> anyhow::Result<()> {
    let backend = FlakyBackend::failing(0);
    let registry = test_registry(backend.clone());

    registry.register(endpoint()).await;
    tokio::time::sleep(PERIOD * 3).await;

    assert_eq!(backend.attempts(), 1);
    assert_eq!(registry.statistics().retries_scheduled(), 0);

    Ok(())
}
