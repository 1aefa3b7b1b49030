//! Collector: ingest queue plus lifecycle.
//!
//! Producers hand validated, enriched batches to a bounded queue and block
//! when it is full; that blocking is the backpressure contract with the
//! ingest layer, not an accident. Exactly one drain task performs `save`,
//! serializing registry mutation while producers enqueue concurrently.
//!
//! Shutdown closes the queue, finishes in-flight and queued batches, drains
//! pending closure events, and finally force-seals every open window, so a
//! clean shutdown never abandons a half-open window (only a crash does, and
//! crash recovery owns that case).

use std::sync::Arc;

use axgate_core::RecordBatch;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bucket::BucketManager;
use crate::config::CollectorConfig;
use crate::error::{Result, StorageError};
use crate::layout::DataLayout;

pub struct Collector {
    tx: mpsc::Sender<RecordBatch>,
    manager: Arc<BucketManager>,
    shutdown: Arc<Notify>,
    drain_task: JoinHandle<()>,
    closer_task: JoinHandle<()>,
}

impl Collector {
    /// Create the buffering pipeline: layout directories, bucket manager,
    /// closure worker, and the single queue-drain task.
    pub fn start(config: &CollectorConfig) -> Result<Self> {
        let layout = DataLayout::new(&config.base_dir);
        layout.create_all()?;

        let (manager, close_rx) = BucketManager::new(layout, config);
        let (tx, mut rx) = mpsc::channel::<RecordBatch>(config.buffer_channel_size.max(1));
        let shutdown = Arc::new(Notify::new());

        let drain_task = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move {
                while let Some(batch) = rx.recv().await {
                    if let Err(e) = manager.save(&batch).await {
                        error!(
                            records = batch.len(),
                            error = %e,
                            "could not save batch to file"
                        );
                    }
                }
            }
        });

        let closer_task = tokio::spawn(
            Arc::clone(&manager).run_closer(close_rx, Arc::clone(&shutdown)),
        );

        Ok(Self {
            tx,
            manager,
            shutdown,
            drain_task,
            closer_task,
        })
    }

    /// Queue a batch for buffering. Blocks while the queue is full; fails
    /// only once the collector is shutting down.
    pub async fn submit(&self, batch: RecordBatch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .map_err(|_| StorageError::QueueClosed)
    }

    /// The bucket manager, for recovery wiring and tests.
    pub fn manager(&self) -> &Arc<BucketManager> {
        &self.manager
    }

    /// Drain everything and seal all open windows.
    pub async fn shutdown(self) {
        info!("shutting down collector");

        // No further enqueues; the drain task finishes what is queued.
        drop(self.tx);
        if self.drain_task.await.is_err() {
            error!("drain task panicked during shutdown");
        }

        // Stop the closure worker after it drains pending close events.
        self.shutdown.notify_one();
        if self.closer_task.await.is_err() {
            error!("closure worker panicked during shutdown");
        }

        self.manager.seal_all().await;
        info!("collector shutdown complete");
    }
}
