//! Read-through driver behind the query handle.
//!
//! Levels are consulted in order; a hit backfills the levels above it and a
//! full miss goes to the data source and populates every active level. Level
//! failures never fail the read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::context::{CacheMode, OperationContext};
use super::entry::CacheEntry;
use super::error::CacheError;
use super::keys::QueryKey;
use super::level::{CacheLevel, Epoch};
use super::metrics::{METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_MISS};

/// One read against the driver.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub key: QueryKey,
    /// Whether the query layer allows caching this result.
    pub cacheable: bool,
    /// Entry lifetime; `None` or zero means the configured default.
    pub ttl: Option<Duration>,
}

impl QueryRequest {
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            cacheable: true,
            ttl: None,
        }
    }

    pub fn uncached(key: QueryKey) -> Self {
        Self {
            key,
            cacheable: false,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Where a returned entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache { level: &'static str },
    Source,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub entry: CacheEntry,
    pub origin: Origin,
}

/// An active level together with the epoch it serves the current read under.
struct Pinned<'a> {
    level: &'a dyn CacheLevel,
    epoch: Epoch,
}

pub struct CachedDriver {
    config: CacheConfig,
    levels: Vec<Arc<dyn CacheLevel>>,
}

impl CachedDriver {
    /// `levels` are ordered nearest first.
    pub fn new(config: CacheConfig, levels: Vec<Arc<dyn CacheLevel>>) -> Self {
        Self { config, levels }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn level_names(&self) -> Vec<&'static str> {
        self.levels.iter().map(|level| level.name()).collect()
    }

    /// Serve `request` from cache, or from `fetch` on a miss.
    ///
    /// Only errors from `fetch` reach the caller.
    pub async fn query<F, Fut, E>(
        &self,
        ctx: &OperationContext,
        request: &QueryRequest,
        fetch: F,
    ) -> Result<Fetched, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, E>>,
    {
        if !self.caches(ctx, request) {
            let entry = fetch().await?;
            return Ok(Fetched {
                entry,
                origin: Origin::Source,
            });
        }

        let active = self.pin_levels(ctx, &request.key).await;

        for (index, pinned) in active.iter().enumerate() {
            match pinned.level.get(ctx, pinned.epoch, &request.key).await {
                Ok(Some(entry)) => {
                    counter!(METRIC_CACHE_HIT, "level" => pinned.level.name()).increment(1);
                    let ttl = self.config.effective_ttl(request.ttl);
                    self.populate(ctx, &request.key, &entry, ttl, &active[..index])
                        .await;
                    return Ok(Fetched {
                        entry,
                        origin: Origin::Cache {
                            level: pinned.level.name(),
                        },
                    });
                }
                Ok(None) => {}
                Err(err) => self.level_failed(ctx, pinned, &request.key, "get", &err).await,
            }
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        let entry = fetch().await?;
        let ttl = self.config.effective_ttl(request.ttl);
        self.populate(ctx, &request.key, &entry, ttl, &active).await;

        Ok(Fetched {
            entry,
            origin: Origin::Source,
        })
    }

    /// Resolve each active level's epoch once for the whole read.
    ///
    /// A level whose epoch cannot be resolved sits the read out.
    async fn pin_levels(&self, ctx: &OperationContext, key: &QueryKey) -> Vec<Pinned<'_>> {
        let mut pinned = Vec::with_capacity(self.levels.len());
        for level in self.levels.iter().filter(|level| level.applies_to(ctx)) {
            match level.epoch(ctx).await {
                Ok(epoch) => pinned.push(Pinned {
                    level: Arc::as_ref(level),
                    epoch,
                }),
                Err(err) => self.record_failure(ctx, Arc::as_ref(level), key, "epoch", &err),
            }
        }
        pinned
    }

    fn caches(&self, ctx: &OperationContext, request: &QueryRequest) -> bool {
        self.config.enabled && request.cacheable && ctx.cache_mode() != CacheMode::Skip
    }

    async fn populate(
        &self,
        ctx: &OperationContext,
        key: &QueryKey,
        entry: &CacheEntry,
        ttl: Duration,
        levels: &[Pinned<'_>],
    ) {
        for pinned in levels {
            if let Err(err) = pinned.level.add(ctx, pinned.epoch, key, entry, ttl).await {
                self.record_failure(ctx, pinned.level, key, "add", &err);
            }
        }
    }

    async fn level_failed(
        &self,
        ctx: &OperationContext,
        pinned: &Pinned<'_>,
        key: &QueryKey,
        op: &'static str,
        err: &CacheError,
    ) {
        self.record_failure(ctx, pinned.level, key, op, err);

        // Undecodable payloads are dropped so the repopulated entry can replace them.
        if matches!(err, CacheError::Serialization(_))
            && let Err(del_err) = pinned.level.del(ctx, pinned.epoch, key).await
        {
            debug!(
                level = pinned.level.name(),
                key = %key,
                error = %del_err,
                "Failed to drop undecodable cache entry"
            );
        }
    }

    fn record_failure(
        &self,
        ctx: &OperationContext,
        level: &dyn CacheLevel,
        key: &QueryKey,
        op: &'static str,
        err: &CacheError,
    ) {
        counter!(METRIC_CACHE_ERROR, "op" => op, "level" => level.name()).increment(1);
        warn!(
            level = level.name(),
            op,
            key = %key,
            scope = %ctx.scope(),
            unavailable = err.is_unavailable(),
            error = %err,
            "Cache level failed, falling back"
        );
    }
}
