mod support;

use std::collections::HashSet;
use std::convert::Infallible;

use bytes::Bytes;
use metrics_util::debugging::DebuggingRecorder;
use ticketry::cache::{CacheConfig, KvStore};
use ticketry::cache::metrics::{
    METRIC_CACHE_ERROR, METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_INVALIDATION,
    METRIC_INVALIDATION_MS, METRIC_VERSION_WRAP,
};
use ticketry::domain::operation::MutationOp;
use ticketry::domain::tenant::TenantScope;

use support::{memory_stack, read, read_ctx, tenant, ticket_row, tickets_key, write_ctx};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let (store, stack) = memory_stack(CacheConfig {
        max_version: 1,
        ..CacheConfig::default()
    });
    let hook = stack.hook().expect("store configured");
    let t = tenant();
    let key = tickets_key();

    // miss, then hit
    read(&stack, &read_ctx(Some(t)), &key, ticket_row("first")).await;
    read(&stack, &read_ctx(Some(t)), &key, ticket_row("unused")).await;

    // max_version 1 wraps on the first bump
    let written: Result<(), Infallible> = hook
        .wrap(&write_ctx(Some(t)), MutationOp::Update, "tickets", async { Ok(()) })
        .await;
    assert!(written.is_ok());
    hook.drain().await;

    // undecodable entry counts as a level error
    let versions = stack.versions().expect("store configured");
    let full_key = versions
        .versioned_key(&TenantScope::Tenant(t), &key)
        .await
        .expect("key");
    store
        .set(&full_key, Bytes::from_static(b"garbage"), None)
        .await
        .expect("seed garbage");
    read(&stack, &read_ctx(Some(t)), &key, ticket_row("fresh")).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        METRIC_CACHE_HIT,
        METRIC_CACHE_MISS,
        METRIC_CACHE_ERROR,
        METRIC_INVALIDATION,
        METRIC_VERSION_WRAP,
        METRIC_INVALIDATION_MS,
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
