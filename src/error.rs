use thiserror::Error;

#[derive(Debug, Clone, Copy, Error)]
#[error("indexed sets were built against different membership snapshots")]
/// Set algebra was attempted across two [`IndexedSet`](crate::IndexedSet)s
/// that do not share a backing snapshot.
///
/// This is always a programming error on the caller's side; combining sets
/// from different snapshots would silently produce wrong membership, so the
/// operation fails fast instead.
pub struct IncompatibleSnapshot;

#[derive(Debug, Error)]
#[error("no router type registered under name `{0}`")]
/// A chain was requested with a router-type name that was never registered
/// in the [`RouterRegistry`](crate::RouterRegistry).
pub struct UnknownRouter(pub String);

#[derive(Debug, Error)]
/// Errors surfaced synchronously by a routing call.
pub enum RouteError {
    #[error(transparent)]
    IncompatibleSnapshot(#[from] IncompatibleSnapshot),

    #[error("no eligible endpoint left after force router `{router}`")]
    /// A router with the force flag narrowed the candidate set to empty.
    ///
    /// Non-force routers yielding an empty set are not an error, the result
    /// degrades to a valid empty set instead.
    NoAvailableEndpoint { router: &'static str },
}
