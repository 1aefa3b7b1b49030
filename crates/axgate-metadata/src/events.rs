//! Change-event feed handling.
//!
//! The external sync layer publishes two kinds of events: a full snapshot
//! (the replicated database was switched to a new version) and row-level
//! change lists. Scope-table changes are typed and patch the tenant cache
//! in place; the developer-attribution tables only signal "something
//! changed" and invalidate the developer cache wholesale.

use axgate_core::Tenant;
use tracing::{debug, warn};

use crate::cache::LookasideCache;
use crate::error::Result;

/// Tables whose changes invalidate developer attribution.
const DEVELOPER_TABLES: [&str; 4] = [
    "kms.developer",
    "kms.app",
    "kms.api_product",
    "kms.app_credential_apiproduct_mapper",
];

/// The scope table carrying tenant identity rows.
const SCOPE_TABLE: &str = "edgex.data_scope";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOp {
    Insert,
    Update,
    Delete,
}

/// One row-level change from the external feed.
#[derive(Debug, Clone)]
pub struct RowChange {
    pub table: String,
    pub op: RowOp,
    pub scope_uuid: String,
    /// New row contents for inserts/updates on the scope table.
    pub tenant: Option<Tenant>,
}

/// An inbound event from the external change feed.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// Full resync: the replicated store moved to a new version.
    Snapshot,
    /// Incremental row-level changes.
    Change(Vec<RowChange>),
}

/// Apply one inbound event to the caches.
///
/// Only a snapshot can fail: its tenant rebuild reads the store, and a
/// failure there is fatal to the caller (serving from a stale cache after a
/// version switch would corrupt attribution).
pub async fn apply_event(cache: &LookasideCache, event: ChangeEvent) -> Result<()> {
    match event {
        ChangeEvent::Snapshot => {
            debug!("snapshot received, rebuilding caches");
            cache.rebuild_tenant_cache().await?;
            cache.invalidate_developer_cache().await;
            Ok(())
        }
        ChangeEvent::Change(changes) => {
            debug!(count = changes.len(), "change list received");
            for change in changes {
                apply_change(cache, change).await;
            }
            Ok(())
        }
    }
}

async fn apply_change(cache: &LookasideCache, change: RowChange) {
    if change.table == SCOPE_TABLE {
        match change.op {
            RowOp::Insert | RowOp::Update => match change.tenant {
                Some(tenant) => cache.apply_scope_upsert(&change.scope_uuid, tenant).await,
                None => warn!(
                    scope_uuid = %change.scope_uuid,
                    "scope change without row contents, ignoring"
                ),
            },
            RowOp::Delete => cache.apply_scope_delete(&change.scope_uuid).await,
        }
    } else if DEVELOPER_TABLES.contains(&change.table.as_str()) {
        cache.invalidate_developer_cache().await;
    } else {
        debug!(table = %change.table, "ignoring change for unrelated table");
    }
}
