//! Per-operation execution context.
//!
//! Set once at the operation boundary by the cache policy and read-only
//! afterwards. It carries the acting tenant and the cache mode.

use std::sync::Arc;

use super::request::RequestCache;
use crate::domain::tenant::{TenantId, TenantScope};

/// Whether caching applies to the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Request-scoped and distributed levels are both consulted.
    Enabled,
    /// No cache level is consulted or populated.
    Skip,
    /// Neither enabled nor skipped; only the distributed level applies.
    Untouched,
}

impl CacheMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheMode::Enabled => "enabled",
            CacheMode::Skip => "skip",
            CacheMode::Untouched => "untouched",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationContext {
    tenant: Option<TenantId>,
    mode: CacheMode,
    request_cache: Option<Arc<RequestCache>>,
    operation_name: Option<String>,
}

impl OperationContext {
    pub fn new(tenant: Option<TenantId>) -> Self {
        Self {
            tenant,
            mode: CacheMode::Untouched,
            request_cache: None,
            operation_name: None,
        }
    }

    /// Context of a system-level operation with no tenant.
    pub fn system() -> Self {
        Self::new(None)
    }

    pub fn for_tenant(tenant: TenantId) -> Self {
        Self::new(Some(tenant))
    }

    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant
    }

    /// Key scope of this operation; `global` when no tenant is present.
    pub fn scope(&self) -> TenantScope {
        TenantScope::from(self.tenant)
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.mode
    }

    pub fn request_cache(&self) -> Option<&RequestCache> {
        self.request_cache.as_deref()
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// Enable caching with a fresh request-scoped level.
    pub fn with_cache_enabled(mut self) -> Self {
        self.mode = CacheMode::Enabled;
        self.request_cache = Some(Arc::new(RequestCache::default()));
        self
    }

    pub fn with_cache_skipped(mut self) -> Self {
        self.mode = CacheMode::Skip;
        self.request_cache = None;
        self
    }

    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}
