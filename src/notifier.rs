use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::endpoint::{Endpoint, Snapshot};
use crate::statistics::PoolStatistics;

/// Consumer of coalesced membership updates.
///
/// Invoked at most once per coalesced window per subscription key, always
/// with the latest snapshot. [`RouterChain`](crate::RouterChain) implements
/// this by repooling.
pub trait MembershipListener: Send + Sync + 'static {
    fn on_membership_changed(&self, key: &str, snapshot: Snapshot);
}

struct SubscriptionState {
    listener: Arc<dyn MembershipListener>,
    /// The arrival time of the most recent raw event.
    latest_event: Instant,
    /// When the last application ran. Initialised to the subscribe time so
    /// the very first burst is also bounded by the delay window.
    last_applied: Instant,
    /// The payload of the most recent raw event, taken when applied.
    pending: Option<Vec<Endpoint>>,
}

#[derive(Clone)]
/// Debounces raw registry push events per subscription key.
///
/// A burst of events inside the configured delay window collapses into a
/// single application of the *latest* payload: every event records itself
/// as the newest and schedules an application for when the window expires;
/// a scheduled application that finds a newer event arrived in the meantime
/// is a silent no-op. This guarantees the applied state is always the most
/// recent snapshot, never a stale intermediate one, and that at most one
/// application is in flight per key.
///
/// This handle is cheap to clone.
pub struct NotificationCoalescer {
    inner: Arc<CoalescerInner>,
}

struct CoalescerInner {
    delay: Duration,
    subscriptions: Mutex<HashMap<String, Arc<Mutex<SubscriptionState>>>>,
    stop: AtomicBool,
    statistics: PoolStatistics,
}

impl NotificationCoalescer {
    pub fn new(delay: Duration, statistics: PoolStatistics) -> Self {
        Self {
            inner: Arc::new(CoalescerInner {
                delay,
                subscriptions: Mutex::new(HashMap::new()),
                stop: AtomicBool::new(false),
                statistics,
            }),
        }
    }

    /// Registers a listener for `key`, replacing any previous one.
    pub fn subscribe(&self, key: impl Into<String>, listener: Arc<dyn MembershipListener>) {
        let now = Instant::now();
        let state = Arc::new(Mutex::new(SubscriptionState {
            listener,
            latest_event: now,
            last_applied: now,
            pending: None,
        }));
        self.inner.subscriptions.lock().insert(key.into(), state);
    }

    /// Drops the subscription for `key`; any still-scheduled application
    /// for it becomes a no-op.
    pub fn unsubscribe(&self, key: &str) {
        self.inner.subscriptions.lock().remove(key);
    }

    /// Feeds a raw push event into the coalescer.
    ///
    /// The payload must be the full current member list for `key`, not a
    /// diff. Returns immediately; the application runs on a spawned task
    /// once the delay window allows it.
    pub fn on_raw_event(&self, key: &str, payload: Vec<Endpoint>) {
        if self.inner.stop.load(Ordering::Relaxed) {
            debug!(key = %key, "Coalescer is stopped, dropping raw event.");
            return;
        }

        self.inner
            .statistics
            .notifications_received
            .fetch_add(1, Ordering::Relaxed);

        let Some(state) = self.inner.subscriptions.lock().get(key).cloned() else {
            debug!(key = %key, "No subscription for key, dropping raw event.");
            return;
        };

        let (event_time, wait) = {
            let mut state = state.lock();
            let now = Instant::now();
            state.latest_event = now;
            state.pending = Some(payload);

            // Mirror of `elapsed = now - last_applied - delay`: non-negative
            // means the window has passed and the event applies immediately,
            // otherwise wait out the remainder.
            let wait = (state.last_applied + self.inner.delay).saturating_duration_since(now);
            (now, wait)
        };

        let coalescer = self.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            coalescer.apply_if_latest(&key, state, event_time);
        });
    }

    /// Stops the coalescer; nothing applies after this returns.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::Relaxed);
        self.inner.subscriptions.lock().clear();
    }

    fn apply_if_latest(
        &self,
        key: &str,
        state: Arc<Mutex<SubscriptionState>>,
        scheduled_for: Instant,
    ) {
        if self.inner.stop.load(Ordering::Relaxed) {
            return;
        }

        // The key may have been unsubscribed, or re-subscribed with a fresh
        // state, while this run was waiting.
        match self.inner.subscriptions.lock().get(key) {
            Some(current) if Arc::ptr_eq(current, &state) => {},
            _ => return,
        }

        // Holding the per-key lock through the listener call serialises
        // applications for this key; independent keys do not contend.
        let mut state = state.lock();

        if state.latest_event != scheduled_for {
            // A newer event arrived while this run was waiting; its own
            // scheduled application will carry the latest payload.
            debug!(key = %key, "Membership notification superseded by newer event.");
            self.inner
                .statistics
                .notifications_superseded
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(payload) = state.pending.take() else {
            return;
        };

        let snapshot = Snapshot::new(payload);
        state.last_applied = Instant::now();
        self.inner
            .statistics
            .notifications_applied
            .fetch_add(1, Ordering::Relaxed);

        info!(
            key = %key,
            num_endpoints = snapshot.len(),
            "Applying coalesced membership notification."
        );

        let listener = state.listener.clone();
        listener.on_membership_changed(key, snapshot);
    }
}
