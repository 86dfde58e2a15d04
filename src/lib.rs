//! # Rudder
//! The client-side cluster runtime of an RPC framework: rudder turns a
//! registry's raw, eventually-consistent membership feed into a live,
//! queryable, per-call set of eligible remote endpoints.
//!
//! Three subsystems form the address-pool pipeline:
//!
//! - **Indexed routing**: membership is published as an immutable ordered
//!   [`Snapshot`]; routers partition it into [`IndexedSet`] bit-vector
//!   buckets at repool time, so the per-call [`RouterChain::route`] path is
//!   a handful of word-wise intersections with no locks held across I/O.
//! - **Coalesced notifications**: the [`NotificationCoalescer`] absorbs
//!   bursts of registry push events and applies only the latest payload
//!   once per delay window, so a rolling deployment repools the chain once
//!   instead of once per endpoint.
//! - **Failback retries**: the [`RetryScheduler`] re-attempts failed
//!   registry operations at a fixed period until they succeed, are
//!   cancelled, or the owning [`Registry`] shuts down.
//!
//! ## Basic Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rudder::{CallContext, Endpoint, RouterConfig, RouterRegistry, Snapshot, TAG_KEY};
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = RouterRegistry::new();
//! let chain = Arc::new(registry.build_chain(&[("tag", RouterConfig::default())])?);
//!
//! let snapshot = Snapshot::new(vec![
//!     Endpoint::new("10.0.0.1:8000".parse()?).with_attribute(TAG_KEY, "blue"),
//!     Endpoint::new("10.0.0.2:8000".parse()?),
//! ]);
//! chain.repool(snapshot);
//!
//! let call = CallContext::new().with_attachment(TAG_KEY, "blue");
//! let eligible = chain.route(&call)?;
//! assert_eq!(eligible.len(), 1);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate tracing;

mod call;
mod config;
mod endpoint;
mod error;
mod notifier;
mod registry;
mod retry;
mod router;
mod set;
mod statistics;

pub use call::CallContext;
pub use config::{RegistryConfig, RouterConfig, DEFAULT_RETRY_PERIOD};
pub use endpoint::{Endpoint, Snapshot, TAG_KEY};
pub use error::{IncompatibleSnapshot, RouteError, UnknownRouter};
pub use notifier::{MembershipListener, NotificationCoalescer};
pub use registry::{Registry, RegistryBackend};
pub use retry::{
    OperationDescriptor,
    OperationExecutor,
    OperationKind,
    RetryScheduler,
    RetryTask,
};
pub use router::{
    Router,
    RouterChain,
    RouterConstructor,
    RouterRegistry,
    RoutingCache,
    TagRouter,
    NO_TAG,
    TAG_ROUTER_DEFAULT_PRIORITY,
};
pub use set::IndexedSet;
pub use statistics::PoolStatistics;
