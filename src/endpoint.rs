use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::net::SocketAddr;
use std::sync::Arc;

/// The attribute key used by the tag router to partition endpoints.
pub static TAG_KEY: &str = "tag";

#[derive(Clone, Debug, Eq, PartialEq)]
/// A remote callee reachable via a stable address, annotated with
/// key/value attributes used by routing policy.
///
/// Endpoints are immutable once they have been observed as part of a
/// [`Snapshot`].
pub struct Endpoint {
    /// The public address of the endpoint.
    pub addr: SocketAddr,
    attributes: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a routing attribute to the endpoint.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Gets the value of a routing attribute if the endpoint carries it.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|v| v.as_str())
    }
}

#[derive(Clone)]
/// A fixed, ordered view of the currently known endpoints at a point in time.
///
/// Index positions `0..len` are stable for the lifetime of the snapshot and
/// are what [`IndexedSet`](crate::IndexedSet) bits refer to. A fresh
/// membership notification always produces a completely new snapshot, never
/// an edit of an existing one, so indices are never reused across snapshots.
///
/// Snapshots are cheap to clone and compare identity by pointer, which is
/// the basis of the cross-snapshot set-algebra check.
pub struct Snapshot {
    inner: Arc<Vec<Endpoint>>,
}

impl Snapshot {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            inner: Arc::new(endpoints),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Endpoint> {
        self.inner.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Endpoint> {
        self.inner.iter()
    }

    #[inline]
    /// Returns `true` if both snapshots are the same published view.
    ///
    /// Two snapshots built from equal endpoint lists are still distinct,
    /// only the exact shared instance counts.
    pub fn same_origin(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("len", &self.len())
            .finish()
    }
}
