//! Lookaside cache behavior: read-through, invalidation, event dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axgate_core::{DeveloperInfo, Tenant};
use axgate_metadata::{
    apply_event, ChangeEvent, LookasideCache, MetadataError, RowChange, RowOp, ScopeStore,
    SqliteScopeStore,
};

/// Store wrapper that counts how many times each query hits the backend.
struct CountingStore {
    inner: SqliteScopeStore,
    tenant_calls: AtomicUsize,
    developer_calls: AtomicUsize,
}

impl CountingStore {
    async fn seeded() -> Self {
        let inner = SqliteScopeStore::new_in_memory().await.unwrap();
        inner
            .upsert_scope("testid", &Tenant::new("testorg", "testenv", "tenant-1"))
            .await
            .unwrap();
        Self {
            inner,
            tenant_calls: AtomicUsize::new(0),
            developer_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ScopeStore for CountingStore {
    async fn tenant_by_scope(&self, scope_uuid: &str) -> axgate_metadata::Result<Tenant> {
        self.tenant_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.tenant_by_scope(scope_uuid).await
    }

    async fn developer_info(
        &self,
        tenant_id: &str,
        api_key: &str,
    ) -> axgate_metadata::Result<Option<DeveloperInfo>> {
        self.developer_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.developer_info(tenant_id, api_key).await
    }

    async fn all_scopes(&self) -> axgate_metadata::Result<Vec<(String, Tenant)>> {
        self.inner.all_scopes().await
    }
}

#[tokio::test]
async fn read_through_populates_and_second_lookup_skips_store() {
    let store = Arc::new(CountingStore::seeded().await);
    let cache = LookasideCache::new(store.clone(), true);

    let tenant = cache.get_tenant("testid").await.unwrap();
    assert_eq!(tenant.org, "testorg");
    assert_eq!(store.tenant_calls.load(Ordering::SeqCst), 1);

    let tenant = cache.get_tenant("testid").await.unwrap();
    assert_eq!(tenant.env, "testenv");
    assert_eq!(store.tenant_calls.load(Ordering::SeqCst), 1, "second lookup must be a cache hit");
}

#[tokio::test]
async fn disabled_cache_always_queries_the_store() {
    let store = Arc::new(CountingStore::seeded().await);
    let cache = LookasideCache::new(store.clone(), false);

    cache.get_tenant("testid").await.unwrap();
    cache.get_tenant("testid").await.unwrap();
    assert_eq!(store.tenant_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.tenant_count().await, 0);
}

#[tokio::test]
async fn unknown_scope_propagates_and_is_not_cached() {
    let store = Arc::new(CountingStore::seeded().await);
    let cache = LookasideCache::new(store.clone(), true);

    let err = cache.get_tenant("missing").await.unwrap_err();
    assert!(matches!(err, MetadataError::UnknownScope(_)));

    // The failed lookup must not leave a poisoned entry behind.
    let err = cache.get_tenant("missing").await.unwrap_err();
    assert_eq!(err.code(), "UNKNOWN_SCOPE");
    assert_eq!(store.tenant_calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.tenant_count().await, 0);
}

#[tokio::test]
async fn missing_developer_row_yields_empty_info_without_caching_absence() {
    let store = Arc::new(CountingStore::seeded().await);
    let cache = LookasideCache::new(store.clone(), true);

    let info = cache.get_developer_info("tenant-1", "nokey").await;
    assert_eq!(info, DeveloperInfo::default());
    assert_eq!(cache.developer_count().await, 0);

    // Absence is re-checked on the next lookup.
    cache.get_developer_info("tenant-1", "nokey").await;
    assert_eq!(store.developer_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn developer_hit_is_cached() {
    let store = Arc::new(CountingStore::seeded().await);
    {
        let pool = store.inner.pool();
        sqlx::query("INSERT INTO kms_developer (id, username, email) VALUES ('d1', 'dev1', 'dev1@example.com')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO kms_app (id, name, developer_id) VALUES ('a1', 'app1', 'd1')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO kms_api_product (id, name) VALUES ('p1', 'product1')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO kms_app_credential_apiproduct_mapper \
             (tenant_id, appcred_id, app_id, apiprdt_id) VALUES ('tenant-1', 'key1', 'a1', 'p1')",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    let cache = LookasideCache::new(store.clone(), true);
    let info = cache.get_developer_info("tenant-1", "key1").await;
    assert_eq!(info.api_product, "product1");

    cache.get_developer_info("tenant-1", "key1").await;
    assert_eq!(store.developer_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn snapshot_rebuilds_tenant_cache_and_invalidates_developers() {
    let store = Arc::new(CountingStore::seeded().await);
    let cache = LookasideCache::new(store.clone(), true);

    apply_event(&cache, ChangeEvent::Snapshot).await.unwrap();
    assert_eq!(cache.tenant_count().await, 1);

    // Snapshot-loaded entries serve without touching the store.
    let tenant = cache.get_tenant("testid").await.unwrap();
    assert_eq!(tenant.org, "testorg");
    assert_eq!(store.tenant_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scope_changes_patch_the_tenant_cache() {
    let store = Arc::new(CountingStore::seeded().await);
    let cache = LookasideCache::new(store.clone(), true);

    let insert = RowChange {
        table: "edgex.data_scope".to_string(),
        op: RowOp::Insert,
        scope_uuid: "scope-2".to_string(),
        tenant: Some(Tenant::new("org2", "env2", "tenant-2")),
    };
    apply_event(&cache, ChangeEvent::Change(vec![insert]))
        .await
        .unwrap();

    let tenant = cache.get_tenant("scope-2").await.unwrap();
    assert_eq!(tenant.org, "org2");
    assert_eq!(store.tenant_calls.load(Ordering::SeqCst), 0);

    let delete = RowChange {
        table: "edgex.data_scope".to_string(),
        op: RowOp::Delete,
        scope_uuid: "scope-2".to_string(),
        tenant: None,
    };
    apply_event(&cache, ChangeEvent::Change(vec![delete]))
        .await
        .unwrap();
    assert_eq!(cache.tenant_count().await, 0);
}

#[tokio::test]
async fn developer_table_changes_invalidate_the_developer_cache() {
    let store = Arc::new(CountingStore::seeded().await);
    {
        let pool = store.inner.pool();
        sqlx::query("INSERT INTO kms_developer (id, username, email) VALUES ('d1', 'dev1', 'd@e')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO kms_app (id, name, developer_id) VALUES ('a1', 'app1', 'd1')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO kms_api_product (id, name) VALUES ('p1', 'product1')")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO kms_app_credential_apiproduct_mapper \
             (tenant_id, appcred_id, app_id, apiprdt_id) VALUES ('tenant-1', 'key1', 'a1', 'p1')",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    let cache = LookasideCache::new(store.clone(), true);
    cache.get_developer_info("tenant-1", "key1").await;
    assert_eq!(cache.developer_count().await, 1);

    let change = RowChange {
        table: "kms.app".to_string(),
        op: RowOp::Update,
        scope_uuid: String::new(),
        tenant: None,
    };
    apply_event(&cache, ChangeEvent::Change(vec![change]))
        .await
        .unwrap();
    assert_eq!(cache.developer_count().await, 0);
}
