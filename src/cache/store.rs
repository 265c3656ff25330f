//! Remote key-value store seam.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::error::CacheResult;

/// Byte-oriented key-value store backing the distributed cache level and the
/// tenant version counters.
///
/// Implementations must make `incr` atomic: concurrent writers for the same
/// tenant rely on it instead of application-level locking.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read the value at `key`; `Ok(None)` when absent or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>>;

    /// Write `value`, expiring after `ttl` when given.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()>;

    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Atomically increment the integer at `key` (absent counts as 0).
    async fn incr(&self, key: &str) -> CacheResult<i64>;

    async fn ping(&self) -> CacheResult<()>;
}
