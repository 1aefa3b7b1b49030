//! Bucket Manager
//!
//! Maps wall-clock time onto fixed-width windows, lazily materializing one
//! open directory + gzip writer per (tenant, window start):
//!
//! ```text
//! save(batch)
//!     ↓
//! bucket_for(now, tenant)   ← read-lock fast path on the registry
//!     ↓ miss
//! mkdir tmp/<org>~<env>~<startTS>
//! open  <hex>_<start>.<end>_<instance>_writer_0.txt.gz
//! register + schedule close at window end + grace
//!     ↓
//! append records, one flush per batch
//! ```
//!
//! Each window's deferred closure fires on its own timer task and is funneled
//! through one closure worker, which is the only normal-path registry
//! remover: it closes the writer and renames the directory into staging. A
//! rename failure leaves the directory in tmp for the next startup's crash
//! recovery pass; there is no immediate retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axgate_core::{Record, RecordBatch, Tenant};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tracing::{debug, error, info};

use crate::config::CollectorConfig;
use crate::error::{Result, StorageError};
use crate::file_writer::GzipLineWriter;
use crate::layout::DataLayout;

/// Registry key: (tenant `org~env`, window start).
pub type BucketKey = (String, i64);

/// One open window: a directory in tmp/ backed by a single gzip writer.
pub struct Bucket {
    pub key: BucketKey,
    pub dir_name: String,
    writer: Mutex<Option<GzipLineWriter>>,
}

impl Bucket {
    /// Append a whole batch and flush it as one unit.
    async fn append_batch(&self, records: &[Record]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| StorageError::WindowSealed(self.dir_name.clone()))?;
        for record in records {
            writer.append(record)?;
        }
        writer.flush()
    }

    /// Take the writer out and finalize its gzip frame. Returns `false`
    /// when the window was already sealed.
    async fn close_writer(&self) -> Result<bool> {
        let writer = self.writer.lock().await.take();
        match writer {
            Some(writer) => {
                writer.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct BucketManager {
    layout: DataLayout,
    instance_id: String,
    interval_secs: i64,
    grace: Duration,
    buckets: RwLock<HashMap<BucketKey, Arc<Bucket>>>,
    close_tx: mpsc::Sender<BucketKey>,
}

impl BucketManager {
    /// Create the manager plus the closure-event receiver its worker drains.
    pub fn new(layout: DataLayout, config: &CollectorConfig) -> (Arc<Self>, mpsc::Receiver<BucketKey>) {
        let (close_tx, close_rx) = mpsc::channel(64);
        let manager = Arc::new(Self {
            layout,
            instance_id: config.instance_id.clone(),
            interval_secs: config.collection_interval_secs.max(1) as i64,
            grace: Duration::from_secs(config.close_grace_secs),
            buckets: RwLock::new(HashMap::new()),
            close_tx,
        });
        (manager, close_rx)
    }

    /// Save a batch into the window covering the current time.
    pub async fn save(&self, batch: &RecordBatch) -> Result<()> {
        let bucket = self.bucket_for(Utc::now(), &batch.tenant).await?;
        match bucket.append_batch(&batch.records).await {
            // Sealed between lookup and append: the interval is still
            // current, so resolving again opens a fresh window.
            Err(StorageError::WindowSealed(_)) => {
                let bucket = self.bucket_for(Utc::now(), &batch.tenant).await?;
                bucket.append_batch(&batch.records).await
            }
            other => other,
        }
    }

    /// Find or create the window for `now` and `tenant`.
    pub async fn bucket_for(&self, now: DateTime<Utc>, tenant: &Tenant) -> Result<Arc<Bucket>> {
        let window_start = now.timestamp() / self.interval_secs * self.interval_secs;
        let key = (tenant.key(), window_start);

        {
            let buckets = self.buckets.read().await;
            if let Some(bucket) = buckets.get(&key) {
                return Ok(Arc::clone(bucket));
            }
        }

        let mut buckets = self.buckets.write().await;
        // Another saver may have created it while we waited for the lock.
        if let Some(bucket) = buckets.get(&key) {
            return Ok(Arc::clone(bucket));
        }

        let window_end = window_start + self.interval_secs;
        let dir_name = DataLayout::window_dir_name(&key.0, window_start)?;
        let dir_path = self.layout.tmp_dir().join(&dir_name);
        std::fs::create_dir(&dir_path).map_err(|source| StorageError::CannotCreateDir {
            path: dir_path.clone(),
            source,
        })?;

        let file_name = DataLayout::file_name(window_start, window_end, &self.instance_id)?;
        let writer = GzipLineWriter::create(dir_path.join(file_name))?;

        let bucket = Arc::new(Bucket {
            key: key.clone(),
            dir_name: dir_name.clone(),
            writer: Mutex::new(Some(writer)),
        });
        buckets.insert(key.clone(), Arc::clone(&bucket));
        debug!(dir = %dir_name, "opened window");

        // Deferred closure at window end + grace, funneled through the
        // closure worker.
        let delay =
            Duration::from_secs((window_end - now.timestamp()).max(0) as u64) + self.grace;
        let close_tx = self.close_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = close_tx.send(key).await;
        });

        Ok(bucket)
    }

    /// Seal one window: deregister, close the writer, move tmp → staging.
    pub async fn seal_bucket(&self, key: &BucketKey) {
        let bucket = {
            let mut buckets = self.buckets.write().await;
            buckets.remove(key)
        };
        if let Some(bucket) = bucket {
            self.seal(&bucket).await;
        }
    }

    async fn seal(&self, bucket: &Bucket) {
        match bucket.close_writer().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                error!(dir = %bucket.dir_name, error = %e, "failed to finalize window file");
            }
        }

        let from = self.layout.tmp_dir().join(&bucket.dir_name);
        let to = self.layout.staging_dir().join(&bucket.dir_name);
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => debug!(dir = %bucket.dir_name, "window sealed and staged"),
            Err(e) => {
                // Left in tmp; the next startup's crash recovery picks it up.
                error!(
                    dir = %bucket.dir_name,
                    error = %e,
                    "cannot move window from tmp to staging"
                );
            }
        }
    }

    /// Drain closure events until shutdown, then seal whatever remains
    /// queued. The worker owns all normal-path sealing.
    pub async fn run_closer(
        self: Arc<Self>,
        mut close_rx: mpsc::Receiver<BucketKey>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                event = close_rx.recv() => match event {
                    Some(key) => {
                        debug!(tenant = %key.0, window_start = key.1, "close event received");
                        self.seal_bucket(&key).await;
                    }
                    None => break,
                },
                _ = shutdown.notified() => {
                    while let Ok(key) = close_rx.try_recv() {
                        self.seal_bucket(&key).await;
                    }
                    break;
                }
            }
        }
        debug!("closure worker stopped");
    }

    /// Force-close every still-open window and stage it (clean shutdown).
    pub async fn seal_all(&self) {
        let drained: Vec<Arc<Bucket>> = {
            let mut buckets = self.buckets.write().await;
            buckets.drain().map(|(_, b)| b).collect()
        };
        for bucket in drained {
            info!(dir = %bucket.dir_name, "closing window as part of shutdown");
            self.seal(&bucket).await;
        }
    }

    /// Number of open windows, for logs and tests.
    pub async fn open_windows(&self) -> usize {
        self.buckets.read().await.len()
    }
}
