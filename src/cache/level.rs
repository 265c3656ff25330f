//! Cache level abstraction consumed by the cached driver.

use std::time::Duration;

use async_trait::async_trait;

use super::context::OperationContext;
use super::entry::CacheEntry;
use super::error::CacheResult;
use super::keys::QueryKey;

/// Version a level addresses its entries under, resolved once per read.
///
/// The lookup, the backfill and the populate of one read all use the same
/// epoch, so rows loaded before a concurrent bump land under the superseded
/// version instead of the new one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Epoch(Option<u64>);

impl Epoch {
    /// Epoch of levels that are not versioned.
    pub const UNVERSIONED: Epoch = Epoch(None);

    pub const fn at(version: u64) -> Self {
        Self(Some(version))
    }

    pub const fn version(self) -> Option<u64> {
        self.0
    }
}

/// One tier of the read-path cache hierarchy.
///
/// `get` returns `Ok(None)` on a miss; an `Err` always means the level itself
/// failed and the caller should fall through to the next tier.
#[async_trait]
pub trait CacheLevel: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Whether this level takes part in `ctx` at all.
    fn applies_to(&self, ctx: &OperationContext) -> bool;

    /// Pin the epoch for one read. Unversioned levels keep the default.
    async fn epoch(&self, _ctx: &OperationContext) -> CacheResult<Epoch> {
        Ok(Epoch::UNVERSIONED)
    }

    async fn get(
        &self,
        ctx: &OperationContext,
        epoch: Epoch,
        key: &QueryKey,
    ) -> CacheResult<Option<CacheEntry>>;

    async fn add(
        &self,
        ctx: &OperationContext,
        epoch: Epoch,
        key: &QueryKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> CacheResult<()>;

    async fn del(&self, ctx: &OperationContext, epoch: Epoch, key: &QueryKey) -> CacheResult<()>;
}
