use std::time::Duration;

/// Default idle time before an in-flight request is evicted.
pub const DEFAULT_REQUEST_TTL_MS: u64 = 300_000;

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// How long a request may go without a reply before it is evicted and the
    /// boundary is told it timed out.
    pub request_ttl: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_millis(DEFAULT_REQUEST_TTL_MS),
        }
    }
}

impl CoordinatorConfig {
    /// Reads `PARLEY_REQUEST_TTL_MS`, falling back to the default when unset
    /// or unparsable.
    pub fn from_env() -> Self {
        let request_ttl_ms = std::env::var("PARLEY_REQUEST_TTL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REQUEST_TTL_MS);
        Self {
            request_ttl: Duration::from_millis(request_ttl_ms),
        }
    }

    pub fn with_request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl = ttl;
        self
    }
}
