//! Tenant / Developer Lookaside Cache
//!
//! Read-through, eventually-consistent caches in front of the authoritative
//! scope store:
//!
//! ```text
//! get_tenant(scope)
//!     ↓ read lock
//! tenant map ── hit ──→ return
//!     │ miss (no lock held)
//!     ↓
//! ScopeStore query ── UnknownScope ──→ propagate (not cached)
//!     ↓ ok
//! write lock, populate, return
//! ```
//!
//! The tenant map and the developer map take independent locks, so a
//! wholesale developer invalidation never blocks tenant lookups. Concurrent
//! misses for the same key may race to populate it; both writers carry the
//! same value, so last-write-wins is fine.

use std::collections::HashMap;
use std::sync::Arc;

use axgate_core::{DeveloperInfo, Tenant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::store::ScopeStore;

/// Key for the developer map: `tenant_id~api_key`.
fn developer_key(tenant_id: &str, api_key: &str) -> String {
    format!("{tenant_id}~{api_key}")
}

pub struct LookasideCache {
    store: Arc<dyn ScopeStore>,
    enabled: bool,
    tenants: RwLock<HashMap<String, Tenant>>,
    developers: RwLock<HashMap<String, DeveloperInfo>>,
}

impl LookasideCache {
    /// Create a cache over `store`. With `enabled == false` every lookup
    /// goes straight to the store.
    pub fn new(store: Arc<dyn ScopeStore>, enabled: bool) -> Self {
        Self {
            store,
            enabled,
            tenants: RwLock::new(HashMap::new()),
            developers: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a scope uuid to its tenant.
    ///
    /// Cache miss falls through to the store and populates on success.
    /// `UnknownScope` propagates to the caller and is never cached.
    pub async fn get_tenant(&self, scope_uuid: &str) -> Result<Tenant> {
        if !self.enabled {
            return self.store.tenant_by_scope(scope_uuid).await;
        }

        {
            let tenants = self.tenants.read().await;
            if let Some(tenant) = tenants.get(scope_uuid) {
                return Ok(tenant.clone());
            }
        }

        debug!(scope_uuid, "tenant cache miss, loading from store");
        let tenant = self.store.tenant_by_scope(scope_uuid).await?;

        let mut tenants = self.tenants.write().await;
        tenants.insert(scope_uuid.to_string(), tenant.clone());
        Ok(tenant)
    }

    /// Developer attribution for a (tenant id, api key) pair.
    ///
    /// Best-effort: a missing row yields an empty `DeveloperInfo` and is not
    /// cached, so a later registration becomes visible on the next miss.
    pub async fn get_developer_info(&self, tenant_id: &str, api_key: &str) -> DeveloperInfo {
        if !self.enabled {
            return self.query_developer(tenant_id, api_key).await;
        }

        let key = developer_key(tenant_id, api_key);
        {
            let developers = self.developers.read().await;
            if let Some(info) = developers.get(&key) {
                return info.clone();
            }
        }

        debug!(tenant_id, api_key, "developer cache miss, loading from store");
        match self.store.developer_info(tenant_id, api_key).await {
            Ok(Some(info)) => {
                let mut developers = self.developers.write().await;
                developers.insert(key, info.clone());
                info
            }
            Ok(None) => DeveloperInfo::default(),
            Err(e) => {
                debug!(tenant_id, api_key, error = %e, "developer lookup failed");
                DeveloperInfo::default()
            }
        }
    }

    async fn query_developer(&self, tenant_id: &str, api_key: &str) -> DeveloperInfo {
        self.store
            .developer_info(tenant_id, api_key)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Replace the whole tenant map from a bulk store query.
    ///
    /// A store failure here propagates: rebuilding is triggered by a
    /// snapshot switch, and continuing with a stale map would silently
    /// misattribute records.
    pub async fn rebuild_tenant_cache(&self) -> Result<()> {
        let scopes = self.store.all_scopes().await?;
        let count = scopes.len();

        let mut tenants = self.tenants.write().await;
        *tenants = scopes.into_iter().collect();
        debug!(count, "rebuilt tenant cache");
        Ok(())
    }

    /// Drop every developer entry; read-through refills on demand.
    pub async fn invalidate_developer_cache(&self) {
        let mut developers = self.developers.write().await;
        developers.clear();
        debug!("invalidated developer cache");
    }

    /// Overwrite one tenant entry (scope-table insert or update).
    pub async fn apply_scope_upsert(&self, scope_uuid: &str, tenant: Tenant) {
        let mut tenants = self.tenants.write().await;
        tenants.insert(scope_uuid.to_string(), tenant);
        debug!(scope_uuid, "tenant cache entry updated");
    }

    /// Remove one tenant entry (scope-table delete).
    pub async fn apply_scope_delete(&self, scope_uuid: &str) {
        let mut tenants = self.tenants.write().await;
        tenants.remove(scope_uuid);
        debug!(scope_uuid, "tenant cache entry removed");
    }

    /// Number of cached tenants, for logs and tests.
    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }

    /// Number of cached developer entries, for logs and tests.
    pub async fn developer_count(&self) -> usize {
        self.developers.read().await.len()
    }
}
