//! Collector Configuration
//!
//! Controls window sizing, buffering, and the upload path:
//!
//! - **collection_interval_secs**: width of a buffering window (default: 120)
//! - **upload_interval_secs**: staging-directory scan cadence (default: 5)
//! - **buffer_channel_size**: ingest queue slots before producers block (default: 1000)
//! - **close_grace_secs**: extra delay past window end before sealing (default: 5)
//! - **recovery_delay_secs**: delay before async crash repair starts (default: 30)
//! - **max_upload_retries**: failed attempts before quarantine (default: 3)
//! - **retry_failed_batch_size**: quarantined directories recycled per pass (default: 10)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Root directory for local buffering (tmp/staging/failed/recovered live under it).
    pub base_dir: PathBuf,

    /// Base URL of the collection service handing out signed upload URLs.
    pub collection_endpoint: String,

    /// Bearer token sent with signed-URL requests, when the endpoint requires one.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Identifier of this collector instance, embedded in file names so
    /// instances sharing remote storage never collide.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    /// Width of a collection window in seconds (default: 120)
    #[serde(default = "default_collection_interval_secs")]
    pub collection_interval_secs: u64,

    /// Seconds between staging-directory scans (default: 5)
    #[serde(default = "default_upload_interval_secs")]
    pub upload_interval_secs: u64,

    /// Ingest queue capacity; producers block when full (default: 1000)
    #[serde(default = "default_buffer_channel_size")]
    pub buffer_channel_size: usize,

    /// Grace period past window end before the window is sealed, absorbing
    /// in-flight writers (default: 5)
    #[serde(default = "default_close_grace_secs")]
    pub close_grace_secs: u64,

    /// Delay before the asynchronous crash-repair pass starts, so recovery
    /// never blocks service start (default: 30)
    #[serde(default = "default_recovery_delay_secs")]
    pub recovery_delay_secs: u64,

    /// Consecutive failed upload passes before a directory is quarantined
    /// (default: 3)
    #[serde(default = "default_max_upload_retries")]
    pub max_upload_retries: u32,

    /// Quarantined directories moved back to staging per recycle pass
    /// (default: 10)
    #[serde(default = "default_retry_failed_batch_size")]
    pub retry_failed_batch_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./ax-data"),
            collection_endpoint: String::new(),
            bearer_token: None,
            instance_id: default_instance_id(),
            collection_interval_secs: default_collection_interval_secs(),
            upload_interval_secs: default_upload_interval_secs(),
            buffer_channel_size: default_buffer_channel_size(),
            close_grace_secs: default_close_grace_secs(),
            recovery_delay_secs: default_recovery_delay_secs(),
            max_upload_retries: default_max_upload_retries(),
            retry_failed_batch_size: default_retry_failed_batch_size(),
        }
    }
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_collection_interval_secs() -> u64 {
    120
}

fn default_upload_interval_secs() -> u64 {
    5
}

fn default_buffer_channel_size() -> usize {
    1000
}

fn default_close_grace_secs() -> u64 {
    5
}

fn default_recovery_delay_secs() -> u64 {
    30
}

fn default_max_upload_retries() -> u32 {
    3
}

fn default_retry_failed_batch_size() -> usize {
    10
}
