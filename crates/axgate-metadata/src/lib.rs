//! Tenant and developer metadata for the axgate collector.
//!
//! Translates opaque scope ids into tenant identity, and (tenant, api key)
//! pairs into developer attribution, without a database round trip on the
//! common path. The authoritative source is the replicated scope store; the
//! lookaside caches are kept current by an external change-event feed.

pub mod cache;
pub mod error;
pub mod events;
pub mod store;

pub use cache::LookasideCache;
pub use error::{MetadataError, Result};
pub use events::{apply_event, ChangeEvent, RowChange, RowOp};
pub use store::{ScopeStore, SqliteScopeStore};
