#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use ticketry::application::dispatch::OperationDispatcher;
use ticketry::cache::{
    CacheConfig, CacheEntry, CacheError, CacheResult, CacheStack, Fetched, KvStore, MemoryStore,
    OperationContext, QueryKey, QueryRequest,
};
use ticketry::domain::operation::OperationKind;
use ticketry::domain::tenant::TenantId;
use uuid::Uuid;

/// Store that behaves like an unreachable Redis.
#[derive(Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> CacheResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::unavailable("connection refused"))
    }
}

#[async_trait]
impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> CacheResult<Option<Bytes>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> CacheResult<()> {
        self.fail()
    }

    async fn del(&self, _key: &str) -> CacheResult<()> {
        self.fail()
    }

    async fn incr(&self, _key: &str) -> CacheResult<i64> {
        self.fail()
    }

    async fn ping(&self) -> CacheResult<()> {
        self.fail()
    }
}

pub fn tenant() -> TenantId {
    TenantId::new(Uuid::new_v4())
}

pub fn memory_stack(config: CacheConfig) -> (Arc<MemoryStore>, CacheStack) {
    let store = Arc::new(MemoryStore::new());
    let stack = CacheStack::new(config, Some(store.clone()));
    (store, stack)
}

/// Context of a fresh inbound read, as the dispatcher would hand it out.
pub fn read_ctx(tenant: Option<TenantId>) -> OperationContext {
    OperationDispatcher::default()
        .dispatch(OperationKind::Read, OperationContext::new(tenant))
        .ctx
}

/// Context of a fresh inbound write.
pub fn write_ctx(tenant: Option<TenantId>) -> OperationContext {
    OperationDispatcher::default()
        .dispatch(OperationKind::Write, OperationContext::new(tenant))
        .ctx
}

pub fn ticket_row(subject: &str) -> CacheEntry {
    CacheEntry::new(
        vec!["id".to_string(), "subject".to_string()],
        vec![vec![json!(1), json!(subject)]],
    )
}

pub fn tickets_key() -> QueryKey {
    QueryKey::fingerprint(
        "SELECT id, subject FROM tickets WHERE status = $1",
        &[json!("open")],
    )
}

/// Read `key` through the stack's driver, serving `source` on a miss.
pub async fn read(
    stack: &CacheStack,
    ctx: &OperationContext,
    key: &QueryKey,
    source: CacheEntry,
) -> Fetched {
    let request = QueryRequest::new(key.clone());
    match stack
        .driver()
        .query(ctx, &request, || async move { Ok::<_, Infallible>(source) })
        .await
    {
        Ok(fetched) => fetched,
        Err(never) => match never {},
    }
}
