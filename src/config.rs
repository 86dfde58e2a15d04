use std::time::Duration;

/// How long a failed registry operation waits before being re-attempted.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Configuration for a [`Registry`](crate::Registry) instance.
pub struct RegistryConfig {
    /// The fixed period between re-attempts of a failed registry operation.
    ///
    /// Defaults to [`DEFAULT_RETRY_PERIOD`] (5 seconds).
    pub retry_period: Duration,

    /// The minimum delay between two applications of membership
    /// notifications for the same subscription key.
    ///
    /// Bursts of raw push events arriving inside the window are coalesced
    /// into a single application of the latest payload. Defaults to zero,
    /// i.e. apply immediately.
    pub notify_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retry_period: DEFAULT_RETRY_PERIOD,
            notify_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Configuration for a single router built through the
/// [`RouterRegistry`](crate::RouterRegistry).
pub struct RouterConfig {
    /// Overrides the router's default priority. Routers execute in
    /// ascending priority order.
    pub priority: Option<i32>,

    /// When set, an empty result from this router fails the call with
    /// [`RouteError::NoAvailableEndpoint`](crate::RouteError::NoAvailableEndpoint)
    /// instead of degrading to an empty candidate set.
    pub force: bool,

    /// Static default for the router's criterion value, used when the call
    /// context carries none.
    pub default_criterion: Option<String>,
}
