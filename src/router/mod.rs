mod tag;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
pub use tag::{TagRouter, NO_TAG, TAG_ROUTER_DEFAULT_PRIORITY};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::call::CallContext;
use crate::config::RouterConfig;
use crate::endpoint::{Endpoint, Snapshot};
use crate::error::{RouteError, UnknownRouter};
use crate::notifier::MembershipListener;
use crate::set::IndexedSet;

/// A keyed mapping from a routing criterion value to the subset of the
/// snapshot matching it.
///
/// Caches are built wholesale by [`Router::repool`] whenever the backing
/// endpoint list changes and are immutable once published; every bucket
/// shares the exact snapshot the cache was built from.
pub struct RoutingCache {
    snapshot: Snapshot,
    buckets: HashMap<String, IndexedSet>,
}

impl RoutingCache {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            buckets: HashMap::new(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Looks up the bucket for a criterion value.
    pub fn bucket(&self, criterion: &str) -> Option<&IndexedSet> {
        self.buckets.get(criterion)
    }

    /// Gets the bucket for a criterion value, creating it empty if absent.
    ///
    /// Only used while the cache is being built during a repool.
    pub fn bucket_entry(&mut self, criterion: impl Into<String>) -> &mut IndexedSet {
        let snapshot = self.snapshot.clone();
        self.buckets
            .entry(criterion.into())
            .or_insert_with(|| IndexedSet::empty(snapshot))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// A single unit of routing policy.
///
/// Given the current candidate set and an in-flight call, a router narrows
/// the candidates. Routers are stateless with respect to routing itself;
/// their only mutable state is the cache generation managed by the owning
/// [`RouterChain`].
pub trait Router: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Routers execute in ascending priority order.
    fn priority(&self) -> i32;

    /// When true, an empty result from this router fails the call instead
    /// of degrading to an empty candidate set.
    fn is_force(&self) -> bool {
        false
    }

    /// Whether this router needs its cache rebuilt whenever membership
    /// changes. Rule-free routers can skip rebuilding and route statelessly.
    fn should_repool(&self) -> bool {
        true
    }

    /// Partitions `snapshot` into a fresh cache keyed by this router's
    /// criterion. An empty snapshot produces an empty cache, not an error.
    fn repool(&self, snapshot: &Snapshot) -> RoutingCache;

    /// Narrows `candidates` for the given call.
    ///
    /// `cache` is `None` for routers whose [`Router::should_repool`] is
    /// false or before the first membership snapshot has been installed.
    fn route(
        &self,
        candidates: &IndexedSet,
        cache: Option<&RoutingCache>,
        call: &CallContext,
    ) -> Result<IndexedSet, RouteError>;
}

struct ChainState {
    generation: u64,
    snapshot: Option<Snapshot>,
    // One slot per router, in chain order.
    caches: Vec<Option<Arc<RoutingCache>>>,
}

/// The ordered pipeline of routers applied per call, together with the
/// published routing caches.
///
/// Cache publication is a single pointer swap: `route` calls running
/// concurrently with a repool observe either the previous or the new cache
/// generation in full, never a mix.
pub struct RouterChain {
    routers: Vec<Arc<dyn Router>>,
    state: RwLock<Arc<ChainState>>,
    generation_tx: watch::Sender<u64>,
}

impl fmt::Debug for RouterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterChain")
            .field("routers", &self.routers.len())
            .finish_non_exhaustive()
    }
}

impl RouterChain {
    /// Creates a chain from the given routers, ordered by ascending
    /// priority.
    pub fn new(mut routers: Vec<Arc<dyn Router>>) -> Self {
        routers.sort_by_key(|router| router.priority());

        let caches = vec![None; routers.len()];
        let (generation_tx, _) = watch::channel(0);

        Self {
            routers,
            state: RwLock::new(Arc::new(ChainState {
                generation: 0,
                snapshot: None,
                caches,
            })),
            generation_tx,
        }
    }

    /// Installs a new membership snapshot, rebuilding every router's cache
    /// against it and atomically publishing the result.
    ///
    /// Runs concurrently with in-flight [`RouterChain::route`] calls; the
    /// chain expects at most one repool in progress at a time, which the
    /// notification coalescer guarantees upstream.
    pub fn repool(&self, snapshot: Snapshot) {
        let caches = self
            .routers
            .iter()
            .map(|router| {
                router
                    .should_repool()
                    .then(|| Arc::new(router.repool(&snapshot)))
            })
            .collect::<Vec<_>>();

        let generation = {
            let mut guard = self.state.write();
            let generation = guard.generation + 1;
            *guard = Arc::new(ChainState {
                generation,
                snapshot: Some(snapshot.clone()),
                caches,
            });
            generation
        };

        debug!(
            generation = generation,
            num_endpoints = snapshot.len(),
            num_routers = self.routers.len(),
            "Repooled router chain against new membership snapshot."
        );

        let _ = self.generation_tx.send(generation);
    }

    /// Routes a call starting from the full candidate set of the currently
    /// installed snapshot.
    ///
    /// Never blocks on I/O; the cost is one read-locked pointer clone of
    /// the published state plus in-memory set algebra. Before the first
    /// snapshot is installed the eligible set is legitimately empty.
    pub fn route(&self, call: &CallContext) -> Result<Vec<Endpoint>, RouteError> {
        let state = self.state.read().clone();

        let Some(snapshot) = state.snapshot.clone() else {
            return Ok(Vec::new());
        };

        let candidates = IndexedSet::full(snapshot);
        let eligible = self.fold(&state, candidates, call)?;
        Ok(eligible.endpoints())
    }

    /// Routes a call starting from a caller-supplied candidate set.
    ///
    /// The candidates must have been built against the currently installed
    /// snapshot; a set from a different snapshot fails fast with
    /// [`RouteError::IncompatibleSnapshot`].
    pub fn route_from(
        &self,
        candidates: IndexedSet,
        call: &CallContext,
    ) -> Result<IndexedSet, RouteError> {
        let state = self.state.read().clone();

        match state.snapshot.as_ref() {
            Some(snapshot) if snapshot.same_origin(candidates.snapshot()) => {},
            _ => return Err(crate::error::IncompatibleSnapshot.into()),
        }

        self.fold(&state, candidates, call)
    }

    fn fold(
        &self,
        state: &ChainState,
        mut candidates: IndexedSet,
        call: &CallContext,
    ) -> Result<IndexedSet, RouteError> {
        for (router, cache) in self.routers.iter().zip(state.caches.iter()) {
            let narrowed = router.route(&candidates, cache.as_deref(), call)?;

            if narrowed.is_empty() && router.is_force() {
                return Err(RouteError::NoAvailableEndpoint {
                    router: router.name(),
                });
            }

            candidates = narrowed;
        }

        Ok(candidates)
    }

    /// The current cache generation. `0` until the first repool.
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// The currently installed membership snapshot, if any.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.state.read().snapshot.clone()
    }

    /// A stream of cache generations, yielding after every repool.
    pub fn generations(&self) -> WatchStream<u64> {
        WatchStream::new(self.generation_tx.subscribe())
    }
}

impl MembershipListener for RouterChain {
    fn on_membership_changed(&self, key: &str, snapshot: Snapshot) {
        debug!(
            key = %key,
            num_endpoints = snapshot.len(),
            "Membership changed, repooling."
        );
        self.repool(snapshot);
    }
}

/// Constructor for a router type, registered under a stable name.
pub type RouterConstructor = fn(&RouterConfig) -> Arc<dyn Router>;

/// A startup-time registered table mapping a router-type identifier to its
/// constructor.
///
/// Replaces runtime plugin loading: the set of available router types is
/// fixed once the registry has been built, and chains are assembled from
/// `(name, config)` pairs.
pub struct RouterRegistry {
    table: HashMap<&'static str, RouterConstructor>,
}

impl Default for RouterRegistry {
    fn default() -> Self {
        let mut registry = Self {
            table: HashMap::new(),
        };
        registry.register("tag", TagRouter::from_config);
        registry
    }
}

impl RouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a router type under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &'static str, constructor: RouterConstructor) {
        self.table.insert(name, constructor);
    }

    /// Builds an ordered chain from `(router type, config)` pairs.
    pub fn build_chain(
        &self,
        specs: &[(&str, RouterConfig)],
    ) -> Result<RouterChain, UnknownRouter> {
        let mut routers = Vec::with_capacity(specs.len());
        for (name, config) in specs {
            let constructor = self
                .table
                .get(*name)
                .ok_or_else(|| UnknownRouter(name.to_string()))?;
            routers.push(constructor(config));
        }
        Ok(RouterChain::new(routers))
    }
}
