//! Cache configuration
//!
//! Loaded from environment variables with defaults suitable for development.

use crate::{ConfigError, RosterResult};
use std::time::Duration;

/// Configuration for the role and actor caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Cache "not found" answers from the backing store as an absent
    /// sentinel. A later write to the key evicts the sentinel.
    pub cache_missing: bool,

    /// Upper bound on a single backing-store load. `None` waits forever.
    pub load_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_missing: true,
            load_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable caching of backing-store misses.
    pub fn with_cache_missing(mut self, enabled: bool) -> Self {
        self.cache_missing = enabled;
        self
    }

    /// Bound every backing-store load by `timeout`.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = Some(timeout);
        self
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ROSTER_CACHE_MISSING`: "true" or "false" (default: true)
    /// - `ROSTER_CACHE_LOAD_TIMEOUT_MS`: load timeout in milliseconds
    ///   (default: unset, 0 also means no timeout)
    pub fn from_env() -> Self {
        let cache_missing = std::env::var("ROSTER_CACHE_MISSING")
            .ok()
            .map(|s| s.trim().to_lowercase() != "false")
            .unwrap_or(true);

        let load_timeout = std::env::var("ROSTER_CACHE_LOAD_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Self {
            cache_missing,
            load_timeout,
        }
    }

    /// Reject settings the cache cannot honour.
    pub fn validate(&self) -> RosterResult<()> {
        if let Some(timeout) = self.load_timeout {
            if timeout.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: "load_timeout".to_string(),
                    value: format!("{:?}", timeout),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
