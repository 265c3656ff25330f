//! Post-write invalidation.
//!
//! After a mutation commits, the acting tenant's epoch is bumped on a detached
//! task with its own deadline. Cancelling the caller after commit does not
//! cancel the bump, and bump failures never reach the caller.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::context::OperationContext;
use super::lock::mutex_lock;
use super::metrics::{
    METRIC_INVALIDATION, METRIC_INVALIDATION_FAILED, METRIC_INVALIDATION_MS, METRIC_VERSION_WRAP,
};
use super::version::{BumpOutcome, VersionStore};
use crate::domain::operation::MutationOp;
use crate::domain::tenant::{TenantId, TenantScope};

const LOCK_TARGET: &str = "ticketry::cache::hook";

pub struct InvalidationHook {
    versions: VersionStore,
    timeout: Duration,
    tasks: Mutex<JoinSet<()>>,
}

impl InvalidationHook {
    pub fn new(versions: VersionStore, timeout: Duration) -> Self {
        Self {
            versions,
            timeout,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Run `mutation` and schedule invalidation if it succeeds.
    ///
    /// Errors from `mutation` are returned unchanged and skip invalidation.
    pub async fn wrap<T, E, Fut>(
        &self,
        ctx: &OperationContext,
        op: MutationOp,
        entity: &str,
        mutation: Fut,
    ) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let output = mutation.await?;
        self.after_commit(ctx, op, entity);
        Ok(output)
    }

    /// Schedule the epoch bump for a committed mutation.
    ///
    /// Returns `false` when nothing was scheduled because the context has no
    /// tenant.
    pub fn after_commit(&self, ctx: &OperationContext, op: MutationOp, entity: &str) -> bool {
        let Some(tenant) = ctx.tenant() else {
            debug!(op = op.as_str(), entity, "Skipping invalidation for tenantless mutation");
            return false;
        };

        let versions = self.versions.clone();
        let timeout = self.timeout;
        let entity = entity.to_string();

        let mut tasks = mutex_lock(&self.tasks, LOCK_TARGET, "after_commit");
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            invalidate(versions, tenant, timeout, op, &entity).await;
        });
        true
    }

    /// Number of bumps spawned and not yet reaped.
    pub fn pending(&self) -> usize {
        mutex_lock(&self.tasks, LOCK_TARGET, "pending").len()
    }

    /// Wait for every scheduled bump to finish.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *mutex_lock(&self.tasks, LOCK_TARGET, "drain"));
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Invalidation task did not complete");
            }
        }
    }
}

async fn invalidate(
    versions: VersionStore,
    tenant: TenantId,
    timeout: Duration,
    op: MutationOp,
    entity: &str,
) {
    let started_at = Instant::now();
    let scope = TenantScope::Tenant(tenant);

    match tokio::time::timeout(timeout, versions.bump(&scope)).await {
        Ok(Ok(BumpOutcome::Advanced(version))) => {
            counter!(METRIC_INVALIDATION).increment(1);
            debug!(tenant = %tenant, op = op.as_str(), entity, version, "Tenant cache invalidated");
        }
        Ok(Ok(BumpOutcome::Wrapped { from })) => {
            counter!(METRIC_INVALIDATION).increment(1);
            counter!(METRIC_VERSION_WRAP).increment(1);
            info!(
                tenant = %tenant,
                op = op.as_str(),
                entity,
                from,
                "Tenant cache version wrapped to 0"
            );
        }
        Ok(Err(err)) => {
            counter!(METRIC_INVALIDATION_FAILED).increment(1);
            error!(
                tenant = %tenant,
                op = op.as_str(),
                entity,
                error = %err,
                "Failed to invalidate tenant cache"
            );
        }
        Err(_) => {
            counter!(METRIC_INVALIDATION_FAILED).increment(1);
            error!(
                tenant = %tenant,
                op = op.as_str(),
                entity,
                timeout_ms = timeout.as_millis() as u64,
                "Tenant cache invalidation timed out"
            );
        }
    }

    histogram!(METRIC_INVALIDATION_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::cache::keys::KeyBuilder;
    use crate::cache::memory::MemoryStore;

    fn hook(max_version: u64) -> InvalidationHook {
        let store = Arc::new(MemoryStore::new());
        let versions = VersionStore::new(store, KeyBuilder::new("test"), max_version);
        InvalidationHook::new(versions, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn successful_mutation_bumps_tenant() {
        let hook = hook(100);
        let tenant = TenantId::new(Uuid::new_v4());
        let ctx = OperationContext::for_tenant(tenant);

        let out: Result<u32, &str> = hook
            .wrap(&ctx, MutationOp::Create, "ticket", async { Ok(7) })
            .await;
        assert_eq!(out, Ok(7));

        hook.drain().await;
        assert_eq!(
            hook.versions()
                .current(&TenantScope::Tenant(tenant))
                .await
                .expect("current"),
            1
        );
    }

    #[tokio::test]
    async fn failed_mutation_is_not_invalidated() {
        let hook = hook(100);
        let tenant = TenantId::new(Uuid::new_v4());
        let ctx = OperationContext::for_tenant(tenant);

        let out: Result<(), &str> = hook
            .wrap(&ctx, MutationOp::Delete, "ticket", async { Err("constraint") })
            .await;
        assert_eq!(out, Err("constraint"));

        hook.drain().await;
        assert_eq!(
            hook.versions()
                .current(&TenantScope::Tenant(tenant))
                .await
                .expect("current"),
            0
        );
    }

    #[tokio::test]
    async fn tenantless_mutation_schedules_nothing() {
        let hook = hook(100);
        assert!(!hook.after_commit(&OperationContext::system(), MutationOp::Update, "ticket"));
        assert_eq!(hook.pending(), 0);

        hook.drain().await;
        assert_eq!(
            hook.versions()
                .current(&TenantScope::Global)
                .await
                .expect("current"),
            0
        );
    }

    #[tokio::test]
    async fn bump_wraps_in_background() {
        let hook = hook(2);
        let tenant = TenantId::new(Uuid::new_v4());
        let ctx = OperationContext::for_tenant(tenant);

        assert!(hook.after_commit(&ctx, MutationOp::UpdateOne, "ticket"));
        hook.drain().await;
        assert!(hook.after_commit(&ctx, MutationOp::UpdateOne, "ticket"));
        hook.drain().await;

        assert_eq!(
            hook.versions()
                .current(&TenantScope::Tenant(tenant))
                .await
                .expect("current"),
            0
        );
    }
}
