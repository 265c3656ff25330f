//! Tenant-isolated query cache
//!
//! Reads go through two levels:
//!
//! - **Request level**: per-operation deduplication, dropped with the context
//! - **Distributed level**: shared store, keyed by the tenant's current epoch
//!
//! Writes never touch cached entries. A successful mutation bumps the
//! tenant's epoch in the background, which makes every key built afterwards
//! miss. Orphaned entries expire through their TTL.
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_secs = 300
//! max_version = 100000
//! store = "redis"
//! ```

mod config;
mod context;
mod distributed;
mod driver;
mod entry;
mod error;
mod hook;
mod keys;
mod level;
pub(crate) mod lock;
mod memory;
pub mod metrics;
mod policy;
mod request;
mod stack;
mod store;
mod version;

pub use config::CacheConfig;
pub use context::{CacheMode, OperationContext};
pub use distributed::TenantIsolatedLevel;
pub use driver::{CachedDriver, Fetched, Origin, QueryRequest};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult};
pub use hook::InvalidationHook;
pub use keys::{KeyBuilder, QueryKey};
pub use level::{CacheLevel, Epoch};
pub use memory::MemoryStore;
pub use policy::OperationCachePolicy;
pub use request::{RequestCache, RequestLevel};
pub use stack::CacheStack;
pub use store::KvStore;
pub use version::{BumpError, BumpOutcome, VersionStore};
