use std::collections::BTreeMap;

#[derive(Clone, Debug, Default)]
/// Per-invocation routing context.
///
/// Routers read their criterion value from the call's attachments first and
/// fall back to the static parameters inherited from the connection-level
/// configuration. The context is created per call and read-only to routers.
pub struct CallContext {
    attachments: BTreeMap<String, String>,
    static_params: BTreeMap<String, String>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a per-call attribute, e.g. the requested tag.
    pub fn with_attachment(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// Set a static fallback parameter inherited from configuration.
    pub fn with_static_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.static_params.insert(key.into(), value.into());
        self
    }

    /// Resolves an attribute, preferring the call attachment over the static
    /// fallback. Empty values count as absent.
    pub fn attachment(&self, key: &str) -> Option<&str> {
        match self.attachments.get(key).map(String::as_str) {
            Some(v) if !v.is_empty() => Some(v),
            _ => self
                .static_params
                .get(key)
                .map(String::as_str)
                .filter(|v| !v.is_empty()),
        }
    }
}
