//! Storage Error Types
//!
//! Local disk failures are fatal to one window's save attempt, never to the
//! process. Upload failures are retried with bounded attempts by the upload
//! manager before quarantine. All operations return `Result<T>` aliased to
//! `Result<T, StorageError>`.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Cannot create file '{path}': {source}")]
    CannotCreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot read file '{path}': {source}")]
    CannotReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot create directory '{path}': {source}")]
    CannotCreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The window was sealed between lookup and append.
    #[error("Window already sealed: {0}")]
    WindowSealed(String),

    #[error("Invalid window timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Signed URL request failed: {0}")]
    SignedUrl(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Ingest queue closed")]
    QueueClosed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
