use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rudder::{
    Endpoint,
    Registry,
    RegistryBackend,
    RegistryConfig,
    RouterConfig,
    RouterRegistry,
};

/// Backend whose operations always succeed; pushes are driven by the test.
struct QuietBackend;

#[async_trait]
impl RegistryBackend for QuietBackend {
    async fn register(&self, _endpoint: &Endpoint) -> anyhow::Result<()> {
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

fn members(n: usize) -> Vec<Endpoint> {
    (0..n)
        .map(|i| {
            let addr: SocketAddr = format!("10.0.0.{}:8000", i + 1).parse().unwrap();
            Endpoint::new(addr)
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_event_storm_applies_latest_once() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let config = RegistryConfig {
        notify_delay: Duration::from_millis(10),
        ..RegistryConfig::default()
    };
    let registry = Registry::new(Arc::new(QuietBackend), config);

    let chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    registry.subscribe("svc", chain.clone()).await;

    // Three raw pushes inside one 10ms window: t=0, t=5, t=8.
    registry.notify_raw("svc", members(1));
    tokio::time::sleep(Duration::from_millis(5)).await;
    registry.notify_raw("svc", members(2));
    tokio::time::sleep(Duration::from_millis(3)).await;
    registry.notify_raw("svc", members(3));

    // The window expires at t=10; nothing may have applied yet at t=9.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(chain.generation(), 0);

    tokio::time::sleep(Duration::from_millis(5)).await;

    // Exactly one repool, reflecting the last payload.
    assert_eq!(chain.generation(), 1);
    assert_eq!(chain.snapshot().unwrap().len(), 3);

    let stats = registry.statistics();
    assert_eq!(stats.notifications_received(), 3);
    assert_eq!(stats.notifications_applied(), 1);
    assert_eq!(stats.notifications_superseded(), 2);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_spaced_events_each_apply() -> anyhow::Result<()> {
    let config = RegistryConfig {
        notify_delay: Duration::from_millis(10),
        ..RegistryConfig::default()
    };
    let registry = Registry::new(Arc::new(QuietBackend), config);

    let chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    registry.subscribe("svc", chain.clone()).await;

    registry.notify_raw("svc", members(2));
    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(chain.generation(), 1);

    registry.notify_raw("svc", members(4));
    tokio::time::sleep(Duration::from_millis(15)).await;

    assert_eq!(chain.generation(), 2);
    assert_eq!(chain.snapshot().unwrap().len(), 4);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() -> anyhow::Result<()> {
    let config = RegistryConfig {
        notify_delay: Duration::from_millis(10),
        ..RegistryConfig::default()
    };
    let registry = Registry::new(Arc::new(QuietBackend), config);

    let users_chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    let orders_chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    registry.subscribe("users", users_chain.clone()).await;
    registry.subscribe("orders", orders_chain.clone()).await;

    registry.notify_raw("users", members(2));
    registry.notify_raw("orders", members(5));
    tokio::time::sleep(Duration::from_millis(15)).await;

    assert_eq!(users_chain.snapshot().unwrap().len(), 2);
    assert_eq!(orders_chain.snapshot().unwrap().len(), 5);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_notification_after_shutdown() -> anyhow::Result<()> {
    let config = RegistryConfig {
        notify_delay: Duration::from_millis(10),
        ..RegistryConfig::default()
    };
    let registry = Registry::new(Arc::new(QuietBackend), config);

    let chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    registry.subscribe("svc", chain.clone()).await;

    registry.notify_raw("svc", members(2));
    registry.shutdown();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(chain.generation(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_generation_stream_signals_repool() -> anyhow::Result<()> {
    use tokio_stream::StreamExt;

    let registry = Registry::new(Arc::new(QuietBackend), RegistryConfig::default());

    let chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    let mut generations = chain.generations();
    assert_eq!(generations.next().await, Some(0));

    registry.subscribe("svc", chain.clone()).await;
    registry.notify_raw("svc", members(2));

    assert_eq!(generations.next().await, Some(1));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_delivery() -> anyhow::Result<()> {
    let registry = Registry::new(Arc::new(QuietBackend), RegistryConfig::default());

    let chain = Arc::new(
        RouterRegistry::new().build_chain(&[("tag", RouterConfig::default())])?,
    );
    registry.subscribe("svc", chain.clone()).await;
    registry.unsubscribe("svc").await;

    registry.notify_raw("svc", members(2));
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(chain.generation(), 0);
    Ok(())
}
