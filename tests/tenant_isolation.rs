mod support;

use std::convert::Infallible;

use ticketry::cache::{CacheConfig, KeyBuilder, OperationContext, Origin, QueryKey};
use ticketry::domain::operation::MutationOp;
use ticketry::domain::tenant::TenantScope;

use support::{memory_stack, read, read_ctx, tenant, ticket_row, tickets_key, write_ctx};

const DISTRIBUTED: Origin = Origin::Cache {
    level: "distributed",
};

#[tokio::test]
async fn tenants_never_read_each_others_entries() {
    let (_store, stack) = memory_stack(CacheConfig::default());
    let (a, b) = (tenant(), tenant());
    let key = QueryKey::new("colliding-fingerprint");

    let first = read(&stack, &read_ctx(Some(a)), &key, ticket_row("from-a")).await;
    assert_eq!(first.origin, Origin::Source);

    let other = read(&stack, &read_ctx(Some(b)), &key, ticket_row("from-b")).await;
    assert_eq!(other.origin, Origin::Source);
    assert_eq!(other.entry, ticket_row("from-b"));

    let again_a = read(&stack, &read_ctx(Some(a)), &key, ticket_row("unused")).await;
    assert_eq!(again_a.origin, DISTRIBUTED);
    assert_eq!(again_a.entry, ticket_row("from-a"));

    let again_b = read(&stack, &read_ctx(Some(b)), &key, ticket_row("unused")).await;
    assert_eq!(again_b.origin, DISTRIBUTED);
    assert_eq!(again_b.entry, ticket_row("from-b"));
}

#[tokio::test]
async fn isolation_holds_when_versions_match() {
    let (_store, stack) = memory_stack(CacheConfig::default());
    let (a, b) = (tenant(), tenant());
    let versions = stack.versions().expect("store configured");
    let key = tickets_key();

    // Both tenants at version 1: only the tenant segment separates the keys.
    versions.bump(&TenantScope::Tenant(b)).await.expect("bump b");
    versions.bump(&TenantScope::Tenant(a)).await.expect("bump a");

    read(&stack, &read_ctx(Some(a)), &key, ticket_row("a-v1")).await;
    let fetched = read(&stack, &read_ctx(Some(b)), &key, ticket_row("b-v1")).await;

    assert_eq!(fetched.origin, Origin::Source);
    assert_eq!(fetched.entry, ticket_row("b-v1"));
}

#[tokio::test]
async fn global_scope_is_isolated_from_tenants() {
    let (_store, stack) = memory_stack(CacheConfig::default());
    let a = tenant();
    let key = tickets_key();

    // A system context is neither enabled nor skipped, so it still uses the
    // distributed level under the `global` scope.
    let system = OperationContext::system();
    read(&stack, &system, &key, ticket_row("global")).await;
    let cached = read(&stack, &OperationContext::system(), &key, ticket_row("unused")).await;
    assert_eq!(cached.origin, DISTRIBUTED);

    let fetched = read(&stack, &read_ctx(Some(a)), &key, ticket_row("tenant")).await;
    assert_eq!(fetched.origin, Origin::Source);
    assert_eq!(fetched.entry, ticket_row("tenant"));
}

#[test]
fn store_keys_differ_per_tenant_for_the_same_fingerprint() {
    let keys = KeyBuilder::new("helpdesk");
    let (a, b) = (tenant(), tenant());
    let key = tickets_key();

    let key_a = keys.entry_key(&TenantScope::Tenant(a), 0, &key);
    let key_b = keys.entry_key(&TenantScope::Tenant(b), 0, &key);

    assert_ne!(key_a, key_b);
    assert!(key_a.starts_with(&format!("qcache:v2:service:helpdesk:tenant:{a}:v0:")));
    assert!(key_b.starts_with(&format!("qcache:v2:service:helpdesk:tenant:{b}:v0:")));
}

#[tokio::test]
async fn write_for_one_tenant_leaves_the_other_cached() {
    let (_store, stack) = memory_stack(CacheConfig::default());
    let hook = stack.hook().expect("store configured");
    let (t1, t2) = (tenant(), tenant());
    let q1 = tickets_key();

    read(&stack, &read_ctx(Some(t1)), &q1, ticket_row("result-v0")).await;
    read(&stack, &read_ctx(Some(t2)), &q1, ticket_row("t2-result")).await;

    let written = hook
        .wrap(&write_ctx(Some(t1)), MutationOp::Update, "tickets", async {
            Ok::<_, Infallible>(1u64)
        })
        .await;
    assert_eq!(written.ok(), Some(1));
    hook.drain().await;

    let versions = stack.versions().expect("store configured");
    assert_eq!(versions.current(&TenantScope::Tenant(t1)).await.expect("t1"), 1);
    assert_eq!(versions.current(&TenantScope::Tenant(t2)).await.expect("t2"), 0);

    let t1_read = read(&stack, &read_ctx(Some(t1)), &q1, ticket_row("result-v1")).await;
    assert_eq!(t1_read.origin, Origin::Source);
    assert_eq!(t1_read.entry, ticket_row("result-v1"));

    let t2_read = read(&stack, &read_ctx(Some(t2)), &q1, ticket_row("unused")).await;
    assert_eq!(t2_read.origin, DISTRIBUTED);
    assert_eq!(t2_read.entry, ticket_row("t2-result"));

    let t1_again = read(&stack, &read_ctx(Some(t1)), &q1, ticket_row("unused")).await;
    assert_eq!(t1_again.origin, DISTRIBUTED);
    assert_eq!(t1_again.entry, ticket_row("result-v1"));
}

#[tokio::test]
async fn request_level_serves_repeat_reads_within_one_operation() {
    let (_store, stack) = memory_stack(CacheConfig::default());
    let ctx = read_ctx(Some(tenant()));
    let key = tickets_key();

    read(&stack, &ctx, &key, ticket_row("first")).await;
    let repeat = read(&stack, &ctx, &key, ticket_row("unused")).await;

    assert_eq!(repeat.origin, Origin::Cache { level: "request" });
    assert_eq!(ctx.request_cache().map(|cache| cache.len()), Some(1));
}
