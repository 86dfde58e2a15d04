use std::sync::Arc;

use crate::call::CallContext;
use crate::config::RouterConfig;
use crate::endpoint::{Snapshot, TAG_KEY};
use crate::error::RouteError;
use crate::router::{Router, RoutingCache};
use crate::set::IndexedSet;

/// Reserved bucket for endpoints carrying no tag attribute, and the routing
/// destination for calls carrying no tag.
pub static NO_TAG: &str = "noTag";

/// Default priority of the tag router. Mid-range so application-defined
/// routers can run either side of it.
pub const TAG_ROUTER_DEFAULT_PRIORITY: i32 = 100;

/// Partitions the address pool by the `tag` endpoint attribute.
///
/// Repooling buckets every endpoint under its tag value, with untagged
/// endpoints collected under the reserved [`NO_TAG`] bucket. A call's tag
/// is resolved from its attachments first, then the configured default,
/// and finally falls back to [`NO_TAG`].
///
/// Routing is fail-open by default: a tag with no bucket leaves the
/// candidate set untouched rather than emptying it. With the force flag
/// set, an empty intersection fails the call instead.
pub struct TagRouter {
    priority: i32,
    force: bool,
    default_tag: Option<String>,
}

impl TagRouter {
    pub fn new() -> Self {
        Self {
            priority: TAG_ROUTER_DEFAULT_PRIORITY,
            force: false,
            default_tag: None,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Arc<dyn Router> {
        Arc::new(Self {
            priority: config.priority.unwrap_or(TAG_ROUTER_DEFAULT_PRIORITY),
            force: config.force,
            default_tag: config.default_criterion.clone(),
        })
    }
}

impl Default for TagRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for TagRouter {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_force(&self) -> bool {
        self.force
    }

    fn repool(&self, snapshot: &Snapshot) -> RoutingCache {
        let mut cache = RoutingCache::new(snapshot.clone());

        for (index, endpoint) in snapshot.iter().enumerate() {
            let tag = match endpoint.attribute(TAG_KEY) {
                Some(tag) if !tag.is_empty() => tag,
                _ => NO_TAG,
            };
            cache.bucket_entry(tag).insert(index);
        }

        cache
    }

    fn route(
        &self,
        candidates: &IndexedSet,
        cache: Option<&RoutingCache>,
        call: &CallContext,
    ) -> Result<IndexedSet, RouteError> {
        let tag = call
            .attachment(TAG_KEY)
            .or(self.default_tag.as_deref())
            .unwrap_or(NO_TAG);

        // No cache yet, or no bucket for this tag: fail open.
        let Some(bucket) = cache.and_then(|cache| cache.bucket(tag)) else {
            return Ok(candidates.clone());
        };

        Ok(candidates.intersect(bucket)?)
    }
}
