//! Postgres dual client: a cached read handle and an invalidating write handle.

mod lifecycle;
mod mutation;
mod query;

pub use lifecycle::{ClientSlot, Closeable, DatabaseLifecycle};
pub use mutation::MutationClient;
pub use query::QueryClient;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    ConnectOptions,
    postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode},
};
use tracing::info;

use crate::application::dispatch::Route;
use crate::cache::{CacheStack, InvalidationHook};
use crate::config::{DatabaseSettings, EndpointSettings};

use super::error::InfraError;

/// Handle selected for one operation.
#[derive(Clone, Copy)]
pub enum RoutedClient<'a> {
    Query(&'a QueryClient),
    Mutation(&'a MutationClient),
}

pub struct DatabaseClient {
    query: QueryClient,
    mutation: MutationClient,
    hook: Option<Arc<InvalidationHook>>,
}

impl DatabaseClient {
    /// Open both pools. If the write pool cannot be opened the read pool is
    /// closed again before the error is returned.
    pub async fn connect(settings: &DatabaseSettings, cache: &CacheStack) -> Result<Self, InfraError> {
        let query_pool = open_pool(settings, &settings.query, "query").await?;
        let mutation_pool = match open_pool(settings, &settings.mutation, "mutation").await {
            Ok(pool) => pool,
            Err(err) => {
                query_pool.close().await;
                return Err(err);
            }
        };

        Ok(Self::from_pools(query_pool, mutation_pool, cache))
    }

    pub fn from_pools(query_pool: PgPool, mutation_pool: PgPool, cache: &CacheStack) -> Self {
        let hook = cache.hook();
        Self {
            query: QueryClient::new(query_pool, cache.driver()),
            mutation: MutationClient::new(mutation_pool, hook.clone()),
            hook,
        }
    }

    /// Read handle. Must never run statements that change state.
    pub fn query(&self) -> &QueryClient {
        &self.query
    }

    pub fn mutation(&self) -> &MutationClient {
        &self.mutation
    }

    pub fn for_route(&self, route: Route) -> RoutedClient<'_> {
        match route {
            Route::Query => RoutedClient::Query(&self.query),
            Route::Mutation => RoutedClient::Mutation(&self.mutation),
        }
    }

    pub async fn health_check(&self) -> Result<(), InfraError> {
        ping(self.query.pool()).await?;
        ping(self.mutation.pool()).await
    }

    /// Wait for pending invalidations, then close both pools.
    pub async fn close(&self) {
        if let Some(hook) = self.hook.as_ref() {
            hook.drain().await;
        }
        self.query.pool().close().await;
        self.mutation.pool().close().await;
        info!("Database clients closed");
    }
}

#[async_trait]
impl Closeable for DatabaseClient {
    async fn close(&self) {
        DatabaseClient::close(self).await;
    }
}

pub fn connect_options(
    settings: &DatabaseSettings,
    endpoint: &EndpointSettings,
) -> Result<PgConnectOptions, InfraError> {
    let ssl_mode = PgSslMode::from_str(&settings.sslmode).map_err(|err| {
        InfraError::configuration(format!("invalid sslmode `{}`: {err}", settings.sslmode))
    })?;

    let options = PgConnectOptions::new()
        .host(&endpoint.host)
        .port(endpoint.port)
        .username(&settings.user)
        .password(&settings.password)
        .database(&settings.name)
        .ssl_mode(ssl_mode)
        .options([("search_path", settings.schema.as_str())]);

    Ok(if settings.debug {
        options
    } else {
        options.disable_statement_logging()
    })
}

pub fn pool_options(settings: &DatabaseSettings) -> PgPoolOptions {
    let pool = &settings.pool;
    PgPoolOptions::new()
        .max_connections(pool.max_open.get())
        .min_connections(pool.min_idle)
        .max_lifetime(pool.max_lifetime)
        .idle_timeout(pool.idle_timeout)
        .acquire_timeout(pool.acquire_timeout)
}

async fn open_pool(
    settings: &DatabaseSettings,
    endpoint: &EndpointSettings,
    role: &'static str,
) -> Result<PgPool, InfraError> {
    let options = connect_options(settings, endpoint)?;
    let pool = pool_options(settings)
        .connect_with(options)
        .await
        .map_err(|err| {
            InfraError::database(format!(
                "failed to open {role} pool at {}:{}: {err}",
                endpoint.host, endpoint.port
            ))
        })?;

    if let Err(err) = ping(&pool).await {
        pool.close().await;
        return Err(err);
    }

    info!(
        role,
        host = %endpoint.host,
        port = endpoint.port,
        max_open = settings.pool.max_open.get(),
        "Database pool ready"
    );
    Ok(pool)
}

async fn ping(pool: &PgPool) -> Result<(), InfraError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(InfraError::from)
}

#[cfg(test)]
pub(crate) fn test_settings() -> DatabaseSettings {
    use crate::config::PoolSettings;
    use std::num::NonZeroU32;
    use std::time::Duration;

    DatabaseSettings {
        user: "postgres".to_string(),
        password: String::new(),
        name: "postgres".to_string(),
        sslmode: "disable".to_string(),
        schema: "app".to_string(),
        query: EndpointSettings {
            host: "replica.invalid".to_string(),
            port: 5432,
        },
        mutation: EndpointSettings {
            host: "primary.invalid".to_string(),
            port: 5432,
        },
        debug: false,
        pool: PoolSettings {
            max_open: NonZeroU32::new(2).expect("non-zero"),
            min_idle: 0,
            max_lifetime: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
            acquire_timeout: Duration::from_millis(200),
        },
    }
}

#[cfg(test)]
pub(crate) fn lazy_pool(settings: &DatabaseSettings) -> PgPool {
    let options = connect_options(settings, &settings.query).expect("valid options");
    pool_options(settings).connect_lazy_with(options)
}
