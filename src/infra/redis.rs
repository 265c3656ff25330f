//! Redis-backed `KvStore` with a background health monitor.
//!
//! The monitor pings the connection on an interval. A failed ping drops the
//! connection so store calls fail fast with `Unavailable` until a reconnect
//! succeeds; reconnect attempts back off exponentially.

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::lock::{mutex_lock, rw_read, rw_write};
use crate::cache::{CacheError, CacheResult, KvStore};
use crate::config::RedisSettings;

use super::error::InfraError;

const LOCK_TARGET: &str = "ticketry::infra::redis";

pub struct RedisStore {
    connection: RwLock<Option<ConnectionManager>>,
    command_timeout: Duration,
}

impl RedisStore {
    fn new(command_timeout: Duration) -> Self {
        Self {
            connection: RwLock::new(None),
            command_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        rw_read(&self.connection, LOCK_TARGET, "is_connected").is_some()
    }

    fn install(&self, connection: ConnectionManager) {
        *rw_write(&self.connection, LOCK_TARGET, "install") = Some(connection);
    }

    fn clear(&self) {
        rw_write(&self.connection, LOCK_TARGET, "clear").take();
    }

    fn connection(&self) -> CacheResult<ConnectionManager> {
        rw_read(&self.connection, LOCK_TARGET, "connection")
            .clone()
            .ok_or_else(|| CacheError::unavailable("redis connection is not established"))
    }

    async fn run<T, Fut>(&self, command: Fut) -> CacheResult<T>
    where
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, command).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(CacheError::Timeout(self.command_timeout)),
        }
    }
}

fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.kind() == redis::ErrorKind::TypeError {
        CacheError::serialization(err)
    } else {
        CacheError::unavailable(err)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        let mut conn = self.connection()?;
        let raw: Option<Vec<u8>> = self.run(conn.get(key)).await?;
        Ok(raw.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.connection()?;
        match ttl {
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                let _: () = self.run(conn.set_ex(key, value.as_ref(), seconds)).await?;
            }
            None => {
                let _: () = self.run(conn.set(key, value.as_ref())).await?;
            }
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let _: () = self.run(conn.del(key)).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.connection()?;
        self.run(conn.incr(key, 1i64)).await
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.connection()?;
        let _pong: String = self.run(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}

/// Owns the Redis client, its store and the health monitor task.
pub struct RedisService {
    store: Arc<RedisStore>,
    shutdown: watch::Sender<bool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl RedisService {
    /// Open the client and start monitoring.
    ///
    /// An unreachable server is not fatal: the service starts unavailable and
    /// the monitor keeps retrying. An unparseable URL is.
    pub async fn start(settings: &RedisSettings) -> Result<Self, InfraError> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|err| InfraError::configuration(format!("invalid redis url: {err}")))?;

        let store = Arc::new(RedisStore::new(settings.command_timeout));
        match connect(&client, settings.connect_timeout).await {
            Ok(connection) => {
                store.install(connection);
                info!("Redis connection established");
            }
            Err(err) => warn!(error = %err, "Redis unavailable at startup, caching degraded"),
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let monitor = tokio::spawn(health_loop(
            client,
            store.clone(),
            settings.clone(),
            shutdown_rx,
        ));

        Ok(Self {
            store,
            shutdown,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    pub fn store(&self) -> Arc<RedisStore> {
        self.store.clone()
    }

    pub fn is_available(&self) -> bool {
        self.store.is_connected()
    }

    /// Stop the monitor and drop the connection. Later calls are no-ops.
    pub async fn close(&self) {
        let handle = mutex_lock(&self.monitor, LOCK_TARGET, "close").take();
        let Some(handle) = handle else {
            return;
        };

        let _ = self.shutdown.send(true);
        if let Err(err) = handle.await {
            warn!(error = %err, "Redis health monitor did not stop cleanly");
        }
        self.store.clear();
        info!("Redis service closed");
    }
}

async fn connect(
    client: &redis::Client,
    timeout: Duration,
) -> Result<ConnectionManager, CacheError> {
    match tokio::time::timeout(timeout, ConnectionManager::new(client.clone())).await {
        Ok(result) => result.map_err(CacheError::unavailable),
        Err(_) => Err(CacheError::Timeout(timeout)),
    }
}

/// Next retry delay after a failed attempt.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

async fn health_loop(
    client: redis::Client,
    store: Arc<RedisStore>,
    settings: RedisSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = settings.health_check_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        if store.is_connected() {
            match store.ping().await {
                Ok(()) => {
                    delay = settings.health_check_interval;
                    continue;
                }
                Err(err) => {
                    warn!(error = %err, "Redis health check failed, marking unavailable");
                    store.clear();
                }
            }
        }

        match connect(&client, settings.connect_timeout).await {
            Ok(connection) => {
                store.install(connection);
                delay = settings.health_check_interval;
                info!("Redis connection restored");
            }
            Err(err) => {
                delay = next_backoff(delay, settings.max_backoff);
                debug!(
                    error = %err,
                    retry_in_secs = delay.as_secs(),
                    "Redis reconnect failed"
                );
            }
        }
    }

    debug!("Redis health monitor stopped");
}
