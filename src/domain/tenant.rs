//! Tenant identity as supplied by the federation boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Literal used for operations that carry no tenant.
pub const GLOBAL_SCOPE: &str = "global";

/// Identifier of an isolated customer organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|err| DomainError::validation(format!("invalid tenant id `{value}`: {err}")))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Cache scope an operation runs under.
///
/// Operations without a tenant share the synthetic `global` scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantScope {
    Tenant(TenantId),
    Global,
}

impl TenantScope {
    pub fn tenant(&self) -> Option<TenantId> {
        match self {
            TenantScope::Tenant(id) => Some(*id),
            TenantScope::Global => None,
        }
    }
}

impl From<Option<TenantId>> for TenantScope {
    fn from(tenant: Option<TenantId>) -> Self {
        tenant.map_or(TenantScope::Global, TenantScope::Tenant)
    }
}

impl FromStr for TenantScope {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case(GLOBAL_SCOPE) {
            return Ok(TenantScope::Global);
        }
        value.parse().map(TenantScope::Tenant)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantScope::Tenant(id) => fmt::Display::fmt(id, f),
            TenantScope::Global => f.write_str(GLOBAL_SCOPE),
        }
    }
}
