//! Wiring of the cache components from configuration.

use std::sync::Arc;

use super::config::CacheConfig;
use super::distributed::TenantIsolatedLevel;
use super::driver::CachedDriver;
use super::hook::InvalidationHook;
use super::keys::KeyBuilder;
use super::level::CacheLevel;
use super::policy::OperationCachePolicy;
use super::request::RequestLevel;
use super::store::KvStore;
use super::version::VersionStore;

/// Every cache component shared by the read and write handles.
///
/// Without a store only the request-scoped level exists and writes have no
/// epoch to bump.
#[derive(Clone)]
pub struct CacheStack {
    config: CacheConfig,
    driver: Arc<CachedDriver>,
    hook: Option<Arc<InvalidationHook>>,
    versions: Option<VersionStore>,
    policy: OperationCachePolicy,
}

impl CacheStack {
    pub fn new(config: CacheConfig, store: Option<Arc<dyn KvStore>>) -> Self {
        let mut levels: Vec<Arc<dyn CacheLevel>> = vec![Arc::new(RequestLevel)];
        let mut versions = None;
        let mut hook = None;

        if let Some(store) = store {
            let keys = KeyBuilder::new(&config.service_name);
            let store_versions = VersionStore::new(store.clone(), keys, config.max_version);
            levels.push(Arc::new(TenantIsolatedLevel::new(
                store,
                store_versions.clone(),
                &config,
            )));
            hook = Some(Arc::new(InvalidationHook::new(
                store_versions.clone(),
                config.invalidation_timeout,
            )));
            versions = Some(store_versions);
        }

        let driver = Arc::new(CachedDriver::new(config.clone(), levels));
        Self {
            config,
            driver,
            hook,
            versions,
            policy: OperationCachePolicy,
        }
    }

    /// Stack with no distributed level.
    pub fn local_only(config: CacheConfig) -> Self {
        Self::new(config, None)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn driver(&self) -> Arc<CachedDriver> {
        self.driver.clone()
    }

    pub fn hook(&self) -> Option<Arc<InvalidationHook>> {
        self.hook.clone()
    }

    pub fn versions(&self) -> Option<&VersionStore> {
        self.versions.as_ref()
    }

    pub fn policy(&self) -> OperationCachePolicy {
        self.policy
    }
}
