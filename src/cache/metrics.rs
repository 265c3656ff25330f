//! Metric names emitted by the cache layer.

pub const METRIC_CACHE_HIT: &str = "ticketry_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "ticketry_cache_miss_total";
pub const METRIC_CACHE_ERROR: &str = "ticketry_cache_error_total";
pub const METRIC_INVALIDATION: &str = "ticketry_cache_invalidation_total";
pub const METRIC_INVALIDATION_FAILED: &str = "ticketry_cache_invalidation_failed_total";
pub const METRIC_VERSION_WRAP: &str = "ticketry_cache_version_wrap_total";
pub const METRIC_INVALIDATION_MS: &str = "ticketry_cache_invalidation_ms";
