use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use sqlx::{Postgres, Transaction, postgres::PgPool};
use tracing::warn;

use crate::cache::{InvalidationHook, OperationContext};
use crate::domain::operation::MutationOp;
use crate::infra::error::InfraError;

/// Ending of an open write transaction.
#[async_trait]
trait Transactional: Send + Sized {
    async fn commit(self) -> Result<(), sqlx::Error>;
    async fn rollback(self) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl Transactional for Transaction<'static, Postgres> {
    async fn commit(self) -> Result<(), sqlx::Error> {
        Transaction::commit(self).await
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        Transaction::rollback(self).await
    }
}

/// Write handle: never cached; committed mutations bump the tenant epoch.
#[derive(Clone)]
pub struct MutationClient {
    pool: PgPool,
    hook: Option<Arc<InvalidationHook>>,
}

impl MutationClient {
    pub fn new(pool: PgPool, hook: Option<Arc<InvalidationHook>>) -> Self {
        Self { pool, hook }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run one mutating statement against the write pool.
    ///
    /// Errors are returned unchanged and skip invalidation.
    pub async fn mutate<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        op: MutationOp,
        entity: &str,
        run: F,
    ) -> Result<T, InfraError>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mutation = run(self.pool.clone());
        let result = match self.hook.as_ref() {
            Some(hook) => hook.wrap(ctx, op, entity, mutation).await,
            None => mutation.await,
        };
        result.map_err(InfraError::from)
    }

    /// Run `run` inside a transaction.
    ///
    /// Rolls back on error. Invalidation is scheduled only after commit.
    pub async fn with_tx<T, F>(
        &self,
        ctx: &OperationContext,
        op: MutationOp,
        entity: &str,
        run: F,
    ) -> Result<T, InfraError>
    where
        F: for<'c> FnOnce(&'c mut Transaction<'static, Postgres>) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        let tx = self.pool.begin().await?;
        self.in_tx(ctx, op, entity, tx, run).await
    }

    async fn in_tx<Tx, T, F>(
        &self,
        ctx: &OperationContext,
        op: MutationOp,
        entity: &str,
        mut tx: Tx,
        run: F,
    ) -> Result<T, InfraError>
    where
        Tx: Transactional,
        F: for<'c> FnOnce(&'c mut Tx) -> BoxFuture<'c, Result<T, sqlx::Error>>,
    {
        match run(&mut tx).await {
            Ok(output) => {
                tx.commit().await?;
                if let Some(hook) = self.hook.as_ref() {
                    hook.after_commit(ctx, op, entity);
                }
                Ok(output)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(entity, error = %rollback_err, "Transaction rollback failed");
                }
                Err(err.into())
            }
        }
    }
}
