//! Request-scoped deduplication level.
//!
//! State lives in the `OperationContext` and dies with it, so there is no TTL
//! and nothing to invalidate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::context::{CacheMode, OperationContext};
use super::entry::CacheEntry;
use super::error::CacheResult;
use super::keys::QueryKey;
use super::level::{CacheLevel, Epoch};
use super::lock::mutex_lock;

const LOCK_TARGET: &str = "ticketry::cache::request";

#[derive(Debug, Default)]
pub struct RequestCache {
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
}

impl RequestCache {
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        mutex_lock(&self.entries, LOCK_TARGET, "get").get(key).cloned()
    }

    pub fn insert(&self, key: QueryKey, entry: CacheEntry) {
        mutex_lock(&self.entries, LOCK_TARGET, "insert").insert(key, entry);
    }

    pub fn remove(&self, key: &QueryKey) {
        mutex_lock(&self.entries, LOCK_TARGET, "remove").remove(key);
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, LOCK_TARGET, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `CacheLevel` view over the context's `RequestCache`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestLevel;

#[async_trait]
impl CacheLevel for RequestLevel {
    fn name(&self) -> &'static str {
        "request"
    }

    fn applies_to(&self, ctx: &OperationContext) -> bool {
        ctx.cache_mode() == CacheMode::Enabled && ctx.request_cache().is_some()
    }

    async fn get(
        &self,
        ctx: &OperationContext,
        _epoch: Epoch,
        key: &QueryKey,
    ) -> CacheResult<Option<CacheEntry>> {
        Ok(ctx.request_cache().and_then(|cache| cache.get(key)))
    }

    async fn add(
        &self,
        ctx: &OperationContext,
        _epoch: Epoch,
        key: &QueryKey,
        entry: &CacheEntry,
        _ttl: Duration,
    ) -> CacheResult<()> {
        if let Some(cache) = ctx.request_cache() {
            cache.insert(key.clone(), entry.clone());
        }
        Ok(())
    }

    async fn del(&self, ctx: &OperationContext, _epoch: Epoch, key: &QueryKey) -> CacheResult<()> {
        if let Some(cache) = ctx.request_cache() {
            cache.remove(key);
        }
        Ok(())
    }
}
