//! Lazy construction and one-shot teardown of the database clients.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::DatabaseClient;
use crate::cache::CacheStack;
use crate::config::DatabaseSettings;
use crate::infra::error::InfraError;

/// Resource released once at shutdown.
#[async_trait]
pub trait Closeable: Send + Sync {
    async fn close(&self);
}

enum SlotState<T> {
    Empty,
    Ready(Arc<T>),
    Closed,
}

/// Constructed on first use, shared afterwards, closed exactly once.
///
/// A failed construction leaves the slot empty so a later call can retry.
/// Nothing is published until construction fully succeeds.
pub struct ClientSlot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T> Default for ClientSlot<T> {
    fn default() -> Self {
        Self {
            state: RwLock::new(SlotState::Empty),
        }
    }
}

impl<T: Closeable> ClientSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<Arc<T>, InfraError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, InfraError>>,
    {
        {
            let state = self.state.read().await;
            match &*state {
                SlotState::Ready(client) => return Ok(client.clone()),
                SlotState::Closed => return Err(InfraError::ShuttingDown),
                SlotState::Empty => {}
            }
        }

        let mut state = self.state.write().await;
        match &*state {
            SlotState::Ready(client) => return Ok(client.clone()),
            SlotState::Closed => return Err(InfraError::ShuttingDown),
            SlotState::Empty => {}
        }

        let client = Arc::new(init().await?);
        *state = SlotState::Ready(client.clone());
        Ok(client)
    }

    /// Current value, without constructing it.
    pub async fn get(&self) -> Option<Arc<T>> {
        match &*self.state.read().await {
            SlotState::Ready(client) => Some(client.clone()),
            SlotState::Empty | SlotState::Closed => None,
        }
    }

    /// Close the value if it was constructed. Returns `true` only for the call
    /// that actually closed it; the slot refuses construction afterwards.
    pub async fn close(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.write().await, SlotState::Closed);
        match previous {
            SlotState::Ready(client) => {
                client.close().await;
                true
            }
            SlotState::Empty | SlotState::Closed => false,
        }
    }
}

/// Composition-root owner of the dual database client.
pub struct DatabaseLifecycle {
    settings: DatabaseSettings,
    cache: CacheStack,
    slot: ClientSlot<DatabaseClient>,
}

impl DatabaseLifecycle {
    pub fn new(settings: DatabaseSettings, cache: CacheStack) -> Self {
        Self {
            settings,
            cache,
            slot: ClientSlot::new(),
        }
    }

    pub fn cache(&self) -> &CacheStack {
        &self.cache
    }

    pub async fn client(&self) -> Result<Arc<DatabaseClient>, InfraError> {
        self.slot
            .get_or_try_init(|| DatabaseClient::connect(&self.settings, &self.cache))
            .await
    }

    pub async fn close(&self) {
        if self.slot.close().await {
            info!("Database lifecycle closed");
        }
    }
}
