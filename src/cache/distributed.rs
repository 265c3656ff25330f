//! Tenant-isolated distributed cache level.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::config::CacheConfig;
use super::context::{CacheMode, OperationContext};
use super::entry::CacheEntry;
use super::error::CacheResult;
use super::keys::QueryKey;
use super::level::{CacheLevel, Epoch};
use super::store::KvStore;
use super::version::VersionStore;

/// Stores entries under `{prefix}tenant:{id}:v{version}:{query}`.
///
/// Entries are addressed by the epoch pinned for the read, falling back to the
/// tenant's current version when none was pinned. A bump makes previously
/// written entries unreachable without touching them.
pub struct TenantIsolatedLevel {
    store: Arc<dyn KvStore>,
    versions: VersionStore,
    default_ttl: Duration,
}

impl TenantIsolatedLevel {
    pub fn new(store: Arc<dyn KvStore>, versions: VersionStore, config: &CacheConfig) -> Self {
        Self {
            store,
            versions,
            default_ttl: config.default_ttl,
        }
    }

    fn ttl_or_default(&self, ttl: Duration) -> Duration {
        if ttl.is_zero() { self.default_ttl } else { ttl }
    }

    async fn entry_key(
        &self,
        ctx: &OperationContext,
        epoch: Epoch,
        key: &QueryKey,
    ) -> CacheResult<String> {
        let scope = ctx.scope();
        match epoch.version() {
            Some(version) => Ok(self.versions.keys().entry_key(&scope, version, key)),
            None => self.versions.versioned_key(&scope, key).await,
        }
    }
}

#[async_trait]
impl CacheLevel for TenantIsolatedLevel {
    fn name(&self) -> &'static str {
        "distributed"
    }

    fn applies_to(&self, ctx: &OperationContext) -> bool {
        ctx.cache_mode() != CacheMode::Skip
    }

    async fn epoch(&self, ctx: &OperationContext) -> CacheResult<Epoch> {
        self.versions.current(&ctx.scope()).await.map(Epoch::at)
    }

    async fn get(
        &self,
        ctx: &OperationContext,
        epoch: Epoch,
        key: &QueryKey,
    ) -> CacheResult<Option<CacheEntry>> {
        let full_key = self.entry_key(ctx, epoch, key).await?;
        match self.store.get(&full_key).await? {
            None => Ok(None),
            Some(raw) => CacheEntry::from_bytes(&raw).map(Some),
        }
    }

    async fn add(
        &self,
        ctx: &OperationContext,
        epoch: Epoch,
        key: &QueryKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> CacheResult<()> {
        let full_key = self.entry_key(ctx, epoch, key).await?;
        let payload = entry.to_bytes()?;
        let ttl = self.ttl_or_default(ttl);
        trace!(key = %full_key, ttl_secs = ttl.as_secs(), "Writing cache entry");
        self.store.set(&full_key, payload, Some(ttl)).await
    }

    async fn del(&self, ctx: &OperationContext, epoch: Epoch, key: &QueryKey) -> CacheResult<()> {
        let full_key = self.entry_key(ctx, epoch, key).await?;
        self.store.del(&full_key).await
    }
}
