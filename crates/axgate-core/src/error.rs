//! Collector Error Taxonomy
//!
//! Error codes are part of the wire contract with callers submitting
//! analytics batches: a rejected batch is reported back as
//! `{"errorCode": ..., "reason": ...}`. The codes here are the full set a
//! caller can observe synchronously; everything past the buffering hand-off
//! is asynchronous and never surfaces to the original caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// No tenant is registered for the given scope id.
    #[error("No tenant found for this scopeuuid: {0}")]
    UnknownScope(String),

    /// The authoritative store could not be queried.
    #[error("Internal search error: {0}")]
    SearchInternal(String),

    /// A record (or the payload shape) is semantically invalid.
    #[error("{0}")]
    BadData(String),

    /// A required field is absent from a record.
    #[error("Missing Required field: {0}")]
    MissingField(String),

    /// The payload carried no records at all.
    #[error("No analytics records in the payload")]
    NoRecords,
}

impl CoreError {
    /// Wire-level error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::UnknownScope(_) => "UNKNOWN_SCOPE",
            CoreError::SearchInternal(_) => "INTERNAL_SEARCH_ERROR",
            CoreError::BadData(_) => "BAD_DATA",
            CoreError::MissingField(_) => "MISSING_FIELD",
            CoreError::NoRecords => "NO_RECORDS",
        }
    }

    /// Serializable response body for this error.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.code().to_string(),
            reason: self.to_string(),
        }
    }
}

/// JSON shape of a rejected batch, `{"errorCode": ..., "reason": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(rename = "errorCode")]
    pub error_code: String,
    pub reason: String,
}
