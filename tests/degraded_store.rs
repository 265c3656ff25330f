mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::json;
use ticketry::cache::{
    CacheConfig, CacheEntry, CacheLevel, CacheStack, Epoch, KeyBuilder, KvStore, MemoryStore, Origin,
    QueryKey, QueryRequest, TenantIsolatedLevel, VersionStore,
};
use ticketry::domain::tenant::TenantScope;

use support::{FailingStore, memory_stack, read, read_ctx, tenant, ticket_row, tickets_key};

fn distributed(store: Arc<MemoryStore>) -> (VersionStore, TenantIsolatedLevel) {
    let config = CacheConfig::default();
    let versions = VersionStore::new(store.clone(), KeyBuilder::new("helpdesk"), config.max_version);
    let level = TenantIsolatedLevel::new(store, versions.clone(), &config);
    (versions, level)
}

fn payload_shapes() -> Vec<CacheEntry> {
    vec![
        CacheEntry::default(),
        CacheEntry::new(vec!["id".to_string()], Vec::new()),
        CacheEntry::scalar_rows("count", [json!(0)]),
        CacheEntry::scalar_rows("subject", [json!("")]),
        CacheEntry::scalar_rows("deleted_at", [json!(null)]),
        ticket_row("printer on fire"),
        CacheEntry::scalar_rows("priority", [json!(1), json!(2), json!(3)]),
        CacheEntry::scalar_rows("score", [json!(-12.5), json!(1e10)]),
        CacheEntry::scalar_rows("tags", [json!(["billing", "urgent"])]),
        CacheEntry::new(
            vec!["id".to_string(), "custom_fields".to_string()],
            vec![vec![
                json!("3f1c2a9e-0000-4000-8000-000000000001"),
                json!({"sla": {"hours": 4, "paused": false}, "labels": []}),
            ]],
        ),
        CacheEntry::scalar_rows("body", [json!("unicode ✓ ünïcödé \"quoted\"\n")]),
        CacheEntry::new(
            vec!["a".to_string(), "b".to_string()],
            (0..50).map(|n| vec![json!(n), json!(n % 2 == 0)]).collect(),
        ),
    ]
}

#[tokio::test]
async fn missing_key_is_not_found_rather_than_empty() {
    let store = Arc::new(MemoryStore::new());
    let (_versions, level) = distributed(store.clone());
    let ctx = read_ctx(Some(tenant()));

    let miss = level.get(&ctx, Epoch::UNVERSIONED, &tickets_key()).await.expect("get");
    assert_eq!(miss, None);

    level
        .add(
            &ctx,
            Epoch::UNVERSIONED,
            &tickets_key(),
            &CacheEntry::default(),
            Duration::from_secs(60),
        )
        .await
        .expect("add");
    let empty = level.get(&ctx, Epoch::UNVERSIONED, &tickets_key()).await.expect("get");
    assert_eq!(empty, Some(CacheEntry::default()));
}

#[tokio::test]
async fn stored_payloads_round_trip_byte_identical() {
    let store = Arc::new(MemoryStore::new());
    let (versions, level) = distributed(store.clone());
    let ctx = read_ctx(Some(tenant()));
    let scope = ctx.scope();

    for (index, entry) in payload_shapes().into_iter().enumerate() {
        let key = QueryKey::new(format!("shape-{index}"));
        level
            .add(&ctx, Epoch::UNVERSIONED, &key, &entry, Duration::from_secs(60))
            .await
            .expect("add");

        let stored = store
            .get(&versions.versioned_key(&scope, &key).await.expect("key"))
            .await
            .expect("get")
            .expect("entry stored");
        assert_eq!(stored, entry.to_bytes().expect("encode"), "shape {index}");

        let fetched = level.get(&ctx, Epoch::UNVERSIONED, &key).await.expect("get");
        assert_eq!(fetched.as_ref(), Some(&entry), "shape {index}");
    }
}

#[tokio::test]
async fn zero_ttl_falls_back_to_default() {
    let store = Arc::new(MemoryStore::new());
    let (_versions, level) = distributed(store.clone());
    let ctx = read_ctx(Some(tenant()));

    level
        .add(&ctx, Epoch::UNVERSIONED, &tickets_key(), &ticket_row("kept"), Duration::ZERO)
        .await
        .expect("add");
    store.purge_expired();

    let fetched = level.get(&ctx, Epoch::UNVERSIONED, &tickets_key()).await.expect("get");
    assert_eq!(fetched, Some(ticket_row("kept")));
}

#[tokio::test]
async fn unreachable_store_falls_back_to_the_source() {
    let store = Arc::new(FailingStore::default());
    let stack = CacheStack::new(CacheConfig::default(), Some(store.clone() as Arc<dyn KvStore>));
    let key = tickets_key();

    for _ in 0..3 {
        let fetched = read(&stack, &read_ctx(Some(tenant())), &key, ticket_row("from-db")).await;
        assert_eq!(fetched.origin, Origin::Source);
        assert_eq!(fetched.entry, ticket_row("from-db"));
    }
    assert!(store.calls() > 0);
}

#[tokio::test]
async fn source_errors_still_reach_the_caller() {
    let store = Arc::new(FailingStore::default());
    let stack = CacheStack::new(CacheConfig::default(), Some(store as Arc<dyn KvStore>));
    let request = QueryRequest::new(tickets_key());

    let result = stack
        .driver()
        .query(&read_ctx(Some(tenant())), &request, || async {
            Err::<CacheEntry, _>("relation \"tickets\" does not exist")
        })
        .await;

    assert_eq!(result.err(), Some("relation \"tickets\" does not exist"));
}

#[tokio::test]
async fn undecodable_entry_is_replaced_by_a_fresh_fetch() {
    let (store, stack) = memory_stack(CacheConfig::default());
    let t = tenant();
    let key = tickets_key();
    let versions = stack.versions().expect("store configured");
    let full_key = versions
        .versioned_key(&TenantScope::Tenant(t), &key)
        .await
        .expect("key");

    store
        .set(&full_key, Bytes::from_static(b"{not json"), None)
        .await
        .expect("seed garbage");

    let fetched = read(&stack, &read_ctx(Some(t)), &key, ticket_row("repaired")).await;
    assert_eq!(fetched.origin, Origin::Source);

    let cached = read(&stack, &read_ctx(Some(t)), &key, ticket_row("unused")).await;
    assert_eq!(cached.origin, Origin::Cache { level: "distributed" });
    assert_eq!(cached.entry, ticket_row("repaired"));
}

#[tokio::test]
async fn disabled_cache_always_reads_the_source() {
    let (store, stack) = memory_stack(CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    });
    let t = tenant();
    let key = tickets_key();

    read(&stack, &read_ctx(Some(t)), &key, ticket_row("first")).await;
    let second = read(&stack, &read_ctx(Some(t)), &key, ticket_row("second")).await;

    assert_eq!(second.origin, Origin::Source);
    assert_eq!(second.entry, ticket_row("second"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn uncacheable_requests_bypass_every_level() {
    let (store, stack) = memory_stack(CacheConfig::default());
    let request = QueryRequest::uncached(tickets_key());

    let fetched = stack
        .driver()
        .query(&read_ctx(Some(tenant())), &request, || async {
            Ok::<_, std::convert::Infallible>(ticket_row("live"))
        })
        .await
        .expect("query");

    assert_eq!(fetched.origin, Origin::Source);
    assert!(store.is_empty());
}
