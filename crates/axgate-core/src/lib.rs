//! Core types for the axgate analytics collector.
//!
//! This crate defines the shared vocabulary of the collector:
//!
//! 1. **Tenant identity**: the (organization, environment, tenant id) triple
//!    that scopes every analytics record.
//! 2. **Record batches**: ordered groups of opaque JSON records handed from
//!    the ingest layer to the buffering layer.
//! 3. **Validation + enrichment**: batch-level timestamp validation and the
//!    tenant/developer field enrichment applied before buffering.
//! 4. **Error taxonomy**: the wire-level error codes shared by every layer.

pub mod error;
pub mod record;
pub mod tenant;

pub use error::{CoreError, ErrorBody, Result};
pub use record::{client_id, enrich_record, validate_batch, validate_record, Record, RecordBatch};
pub use tenant::{DeveloperInfo, Tenant};
