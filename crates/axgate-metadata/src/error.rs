//! Metadata Error Types
//!
//! All store and cache operations return `Result<T>` aliased to
//! `Result<T, MetadataError>` for clean propagation with `?`. `UnknownScope`
//! is the only client-attributable error here; everything else means the
//! authoritative store is unreachable or misbehaving.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("No tenant found for this scopeuuid: {0}")]
    UnknownScope(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal search error: {0}")]
    SearchInternal(String),
}

impl MetadataError {
    /// Wire-level error code, matching the caller-facing taxonomy.
    pub fn code(&self) -> &'static str {
        match self {
            MetadataError::UnknownScope(_) => "UNKNOWN_SCOPE",
            MetadataError::Database(_) | MetadataError::SearchInternal(_) => {
                "INTERNAL_SEARCH_ERROR"
            }
        }
    }
}
