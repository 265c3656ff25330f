//! Cache configuration.
//!
//! Controls the read-path query cache and the tenant epoch bookkeeping.

use std::time::Duration;

// Default values for cache configuration
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_MAX_VERSION: u64 = 100_000;
const DEFAULT_INVALIDATION_TIMEOUT_SECS: u64 = 5;
const DEFAULT_SERVICE_NAME: &str = "default";

/// Resolved cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Enable result caching on the read handle.
    pub enabled: bool,
    /// TTL applied when a caller does not pass one.
    pub default_ttl: Duration,
    /// Exclusive upper bound of a tenant version before it wraps to zero.
    pub max_version: u64,
    /// Deadline of one background invalidation task.
    pub invalidation_timeout: Duration,
    /// Service name baked into every key so sibling services never collide.
    pub service_name: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            max_version: DEFAULT_MAX_VERSION,
            invalidation_timeout: Duration::from_secs(DEFAULT_INVALIDATION_TIMEOUT_SECS),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl: settings.default_ttl,
            max_version: settings.max_version.get(),
            invalidation_timeout: settings.invalidation_timeout,
            service_name: settings.service_name.clone(),
        }
    }
}

impl CacheConfig {
    /// Returns `ttl` unless it is zero, in which case the default TTL.
    pub fn effective_ttl(&self, ttl: Option<Duration>) -> Duration {
        match ttl {
            Some(ttl) if !ttl.is_zero() => ttl,
            _ => self.default_ttl,
        }
    }
}
