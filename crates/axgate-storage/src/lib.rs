//! axgate Storage Layer
//!
//! Durable, crash-safe, at-least-once buffering and delivery of analytics
//! record batches:
//!
//! ```text
//! ┌───────────┐ validated batches
//! │  Ingest   │──────────────┐
//! └───────────┘              ▼
//!                   [bounded queue]          (producers block when full)
//!                            │ one drain task
//!                            ▼
//!                    ┌──────────────┐ window end + grace ┌─────────┐
//!                    │ BucketManager│───────────────────▶│ staging/│
//!                    │  tmp/<win>/  │    atomic rename   └────┬────┘
//!                    └──────────────┘                         │ ticker
//!                            ▲ repaired windows               ▼
//!                    ┌──────────────┐               ┌───────────────┐
//!                    │CrashRecovery │               │ UploadManager │
//!                    │  recovered/  │               │ signed-URL PUT│
//!                    └──────────────┘               └───────┬───────┘
//!                                                           │ retries exhausted
//!                                                           ▼
//!                                                       failed/  (recycled)
//! ```
//!
//! The subsystems are coupled only through the filesystem contract
//! (directory names, file extensions, atomic renames); the upload manager
//! never talks to the bucket manager at runtime.

pub mod bucket;
pub mod collector;
pub mod config;
pub mod error;
pub mod file_writer;
pub mod layout;
pub mod recovery;
pub mod service;
pub mod upload;
pub mod uploader;

pub use bucket::{Bucket, BucketKey, BucketManager};
pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::{Result, StorageError};
pub use file_writer::GzipLineWriter;
pub use layout::DataLayout;
pub use recovery::CrashRecovery;
pub use service::AxgateService;
pub use upload::UploadManager;
pub use uploader::UploadClient;
