//! Top-level service wiring.
//!
//! Owns the startup ordering the subsystems rely on: crash recovery
//! quarantines leftover open windows *before* the collector starts
//! accepting new ones (so new activity can never collide with the repair),
//! and the upload manager ticks independently, coupled to the rest only
//! through the staging directory.

use std::time::Duration;

use axgate_core::RecordBatch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::collector::Collector;
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::layout::DataLayout;
use crate::recovery::CrashRecovery;
use crate::upload::UploadManager;

pub struct AxgateService {
    collector: Collector,
    upload_task: JoinHandle<()>,
    recovery_task: Option<JoinHandle<()>>,
}

impl AxgateService {
    /// Bring up the full pipeline: directories, crash recovery, the
    /// buffering collector, and the upload ticker.
    pub fn start(config: &CollectorConfig) -> Result<Self> {
        let layout = DataLayout::new(&config.base_dir);
        layout.create_all()?;

        // Quarantine happens synchronously in start(); only the slow repair
        // runs later. New windows therefore never collide with recovery.
        let recovery = CrashRecovery::new(
            layout.clone(),
            Duration::from_secs(config.recovery_delay_secs),
        );
        let recovery_task = recovery.start();

        let collector = Collector::start(config)?;

        let upload = UploadManager::new(layout, config)?;
        let upload_task = tokio::spawn(upload.run());

        info!("analytics collector service started");
        Ok(Self {
            collector,
            upload_task,
            recovery_task,
        })
    }

    /// Queue a validated, enriched batch for buffering. Blocks while the
    /// ingest queue is full.
    pub async fn submit(&self, batch: RecordBatch) -> Result<()> {
        self.collector.submit(batch).await
    }

    /// Drain the ingest queue, seal every open window, and stop the
    /// background tickers.
    pub async fn shutdown(self) {
        self.collector.shutdown().await;
        self.upload_task.abort();
        if let Some(task) = self.recovery_task {
            // An interrupted repair is re-attempted on the next startup.
            task.abort();
        }
        info!("analytics collector service stopped");
    }
}
