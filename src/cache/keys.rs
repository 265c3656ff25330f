//! Cache key definitions.
//!
//! Every cached entry lives under
//! `{prefix}tenant:{tenant}:v{version}:{fingerprint}` and every tenant epoch
//! under `{prefix}tenant:{tenant}:version`.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::domain::tenant::TenantScope;

/// Opaque fingerprint of one query with its bound arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into())
    }

    /// Fingerprint SQL text and its arguments with SHA-256.
    pub fn fingerprint(sql: &str, args: &[serde_json::Value]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        for arg in args {
            hasher.update([0u8]);
            hasher.update(arg.to_string().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds fully-qualified store keys for one service.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(service_name: &str) -> Self {
        Self {
            prefix: format!("qcache:v2:service:{service_name}:"),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key holding the epoch counter of `scope`.
    pub fn version_key(&self, scope: &TenantScope) -> String {
        format!("{}tenant:{scope}:version", self.prefix)
    }

    /// Key of one cached entry written under `version`.
    pub fn entry_key(&self, scope: &TenantScope, version: u64, key: &QueryKey) -> String {
        format!("{}tenant:{scope}:v{version}:{key}", self.prefix)
    }
}
