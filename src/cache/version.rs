//! Per-tenant cache epochs.
//!
//! The counter at `{prefix}tenant:{id}:version` is the only state that decides
//! whether a cached entry is still reachable. Entries are never deleted on
//! write; bumping the counter makes every key built afterwards miss.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use super::error::{CacheError, CacheResult};
use super::keys::{KeyBuilder, QueryKey};
use super::store::KvStore;
use crate::domain::tenant::TenantScope;

/// Result of one epoch bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpOutcome {
    /// Counter advanced to the contained value.
    Advanced(u64),
    /// Counter reached the bound and was reset to zero.
    Wrapped { from: u64 },
}

impl BumpOutcome {
    /// Version in effect after the bump.
    pub fn version(self) -> u64 {
        match self {
            BumpOutcome::Advanced(version) => version,
            BumpOutcome::Wrapped { .. } => 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum BumpError {
    #[error("failed to increment tenant version: {0}")]
    Increment(#[source] CacheError),
    #[error("failed to reset tenant version {version} to zero: {source}")]
    Reset {
        version: u64,
        #[source]
        source: CacheError,
    },
}

#[derive(Clone)]
pub struct VersionStore {
    store: Arc<dyn KvStore>,
    keys: KeyBuilder,
    max_version: u64,
}

impl VersionStore {
    pub fn new(store: Arc<dyn KvStore>, keys: KeyBuilder, max_version: u64) -> Self {
        Self {
            store,
            keys,
            max_version: max_version.max(1),
        }
    }

    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    pub fn max_version(&self) -> u64 {
        self.max_version
    }

    /// Current epoch of `scope`; an absent counter is version 0.
    pub async fn current(&self, scope: &TenantScope) -> CacheResult<u64> {
        let key = self.keys.version_key(scope);
        match self.store.get(&key).await? {
            None => Ok(0),
            Some(raw) => parse_version(&key, &raw),
        }
    }

    /// Fully-qualified key of `query` under the current epoch of `scope`.
    pub async fn versioned_key(&self, scope: &TenantScope, query: &QueryKey) -> CacheResult<String> {
        let version = self.current(scope).await?;
        Ok(self.keys.entry_key(scope, version, query))
    }

    /// Atomically advance the epoch of `scope`, resetting it to zero once it
    /// reaches the bound.
    ///
    /// A failed reset leaves the counter past the bound; the next bump crosses
    /// it again and retries the reset.
    pub async fn bump(&self, scope: &TenantScope) -> Result<BumpOutcome, BumpError> {
        let key = self.keys.version_key(scope);
        let raw = self.store.incr(&key).await.map_err(BumpError::Increment)?;
        let version = u64::try_from(raw).unwrap_or(0);

        if version < self.max_version {
            return Ok(BumpOutcome::Advanced(version));
        }

        self.store
            .set(&key, Bytes::from_static(b"0"), None)
            .await
            .map_err(|source| BumpError::Reset { version, source })?;
        Ok(BumpOutcome::Wrapped { from: version })
    }
}

fn parse_version(key: &str, raw: &[u8]) -> CacheResult<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|text| text.trim().parse::<u64>().ok())
        .ok_or_else(|| CacheError::serialization(format!("version at `{key}` is not an integer")))
}
