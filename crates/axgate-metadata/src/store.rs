//! Authoritative scope store.
//!
//! The relational store is a collaborator, not something this crate owns:
//! the trait below is the full interface the cache needs, and the SQLite
//! implementation exists so the collector runs against the same replicated
//! schema the gateway sync layer maintains (`data_scope` plus the kms
//! attribution tables).

use async_trait::async_trait;
use axgate_core::{DeveloperInfo, Tenant};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use crate::error::{MetadataError, Result};

/// Read interface over the authoritative scope data.
#[async_trait]
pub trait ScopeStore: Send + Sync {
    /// Resolve a scope uuid to its tenant. `UnknownScope` when no row exists.
    async fn tenant_by_scope(&self, scope_uuid: &str) -> Result<Tenant>;

    /// Developer attribution for a (tenant id, api key) pair. A missing row
    /// is `Ok(None)`: absent attribution is valid.
    async fn developer_info(&self, tenant_id: &str, api_key: &str)
        -> Result<Option<DeveloperInfo>>;

    /// Full dump of the scope table, for wholesale cache rebuilds.
    async fn all_scopes(&self) -> Result<Vec<(String, Tenant)>>;
}

/// SQLite-backed scope store.
///
/// Can be shared via `Arc<SqliteScopeStore>`; the connection pool handles
/// concurrent access.
pub struct SqliteScopeStore {
    pool: SqlitePool,
}

impl SqliteScopeStore {
    /// Open (or create) a file-backed store.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}", path.as_ref().display()))?
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// In-memory store for tests. A single connection keeps every query on
    /// the same database.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS data_scope (
                id    TEXT PRIMARY KEY,
                scope TEXT NOT NULL,
                org   TEXT NOT NULL,
                env   TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS kms_developer (
                id       TEXT PRIMARY KEY,
                username TEXT,
                email    TEXT
            )",
            "CREATE TABLE IF NOT EXISTS kms_app (
                id           TEXT PRIMARY KEY,
                name         TEXT,
                developer_id TEXT
            )",
            "CREATE TABLE IF NOT EXISTS kms_api_product (
                id   TEXT PRIMARY KEY,
                name TEXT
            )",
            "CREATE TABLE IF NOT EXISTS kms_app_credential_apiproduct_mapper (
                tenant_id  TEXT NOT NULL,
                appcred_id TEXT NOT NULL,
                app_id     TEXT NOT NULL,
                apiprdt_id TEXT NOT NULL
            )",
        ];
        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert or replace a scope row. Used by sync tooling and tests.
    pub async fn upsert_scope(&self, scope_uuid: &str, tenant: &Tenant) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO data_scope (id, scope, org, env) VALUES (?, ?, ?, ?)")
            .bind(scope_uuid)
            .bind(&tenant.tenant_id)
            .bind(&tenant.org)
            .bind(&tenant.env)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a scope row.
    pub async fn remove_scope(&self, scope_uuid: &str) -> Result<()> {
        sqlx::query("DELETE FROM data_scope WHERE id = ?")
            .bind(scope_uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Underlying pool, for callers that seed the kms tables directly.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ScopeStore for SqliteScopeStore {
    async fn tenant_by_scope(&self, scope_uuid: &str) -> Result<Tenant> {
        let row = sqlx::query("SELECT env, org, scope FROM data_scope WHERE id = ?")
            .bind(scope_uuid)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Tenant {
                env: row.try_get("env")?,
                org: row.try_get("org")?,
                tenant_id: row.try_get("scope")?,
            }),
            None => Err(MetadataError::UnknownScope(scope_uuid.to_string())),
        }
    }

    async fn developer_info(
        &self,
        tenant_id: &str,
        api_key: &str,
    ) -> Result<Option<DeveloperInfo>> {
        let row = sqlx::query(
            "SELECT ap.name AS api_product, a.name AS developer_app, \
                    d.username AS developer, d.email AS developer_email \
             FROM kms_app_credential_apiproduct_mapper AS mp \
             INNER JOIN kms_api_product AS ap ON ap.id = mp.apiprdt_id \
             INNER JOIN kms_app AS a ON a.id = mp.app_id \
             INNER JOIN kms_developer AS d ON d.id = a.developer_id \
             WHERE mp.tenant_id = ? AND mp.appcred_id = ?",
        )
        .bind(tenant_id)
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| DeveloperInfo {
            api_product: string_or_empty(&row, "api_product"),
            developer_app: string_or_empty(&row, "developer_app"),
            developer_email: string_or_empty(&row, "developer_email"),
            developer: string_or_empty(&row, "developer"),
        }))
    }

    async fn all_scopes(&self) -> Result<Vec<(String, Tenant)>> {
        let rows = sqlx::query("SELECT id, scope, org, env FROM data_scope")
            .fetch_all(&self.pool)
            .await?;

        let mut scopes = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            if id.is_empty() {
                continue;
            }
            scopes.push((
                id,
                Tenant {
                    tenant_id: row.try_get("scope")?,
                    org: row.try_get("org")?,
                    env: row.try_get("env")?,
                },
            ));
        }
        Ok(scopes)
    }
}

// NULL columns read back as empty strings, same as the upload records expect.
fn string_or_empty(row: &sqlx::sqlite::SqliteRow, column: &str) -> String {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .unwrap_or_default()
}
