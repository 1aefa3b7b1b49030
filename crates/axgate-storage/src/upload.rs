//! Upload Manager
//!
//! Drains the staging area to the remote store on a fixed-interval ticker.
//! Each sealed window directory is uploaded file by file; the first failing
//! file aborts the rest of that directory for the tick (the survivors are
//! retried on the next pass, which is safe because destination keys are
//! content-addressed by name and a re-PUT overwrites the same key).
//!
//! A directory that fails a whole pass has its in-memory retry counter
//! bumped; at the maximum it is moved to the quarantine area and its counter
//! dropped, so any later retry starts the count fresh. After a tick that
//! uploaded at least one directory, a bounded batch of quarantined
//! directories is recycled back to staging, since a recent success is
//! evidence that a correlated remote outage has cleared.

use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::config::CollectorConfig;
use crate::error::Result;
use crate::layout::DataLayout;
use crate::uploader::UploadClient;

pub struct UploadManager {
    layout: DataLayout,
    client: UploadClient,
    interval: Duration,
    max_retries: u32,
    retry_batch_size: usize,
    // Attempt counts for directories currently in the open-or-staging
    // lifecycle; purged on success or quarantine.
    retries: HashMap<String, u32>,
}

impl UploadManager {
    pub fn new(layout: DataLayout, config: &CollectorConfig) -> Result<Self> {
        let client = UploadClient::new(
            config.collection_endpoint.clone(),
            config.bearer_token.clone(),
        )?;
        Ok(Self {
            layout,
            client,
            interval: Duration::from_secs(config.upload_interval_secs.max(1)),
            max_retries: config.max_upload_retries.max(1),
            retry_batch_size: config.retry_failed_batch_size,
            retries: HashMap::new(),
        })
    }

    /// Tick forever. Runs until the owning task is dropped or aborted.
    pub async fn run(mut self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("upload manager watching staging directory");
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One pass over the staging area.
    pub async fn tick(&mut self) {
        let dirs = list_dirs(self.layout.staging_dir());

        let mut uploaded = 0usize;
        for dir_name in dirs {
            let ok = self.upload_dir(&dir_name).await;
            self.handle_dir_status(&dir_name, ok);
            if ok {
                uploaded += 1;
                debug!(dir = %dir_name, "successfully uploaded");
            }
        }

        if uploaded > 0 {
            // Quarantined windows often failed on a transient remote outage;
            // a fresh success suggests it cleared.
            self.recycle_failed();
        }
    }

    /// Upload every file in one staged directory. The directory's status is
    /// the status of the last file processed before any failure.
    async fn upload_dir(&self, dir_name: &str) -> bool {
        let Some((tenant, window_ts)) = DataLayout::split_dir_name(dir_name) else {
            warn!(dir = %dir_name, "staged directory name is not a window, skipping");
            return false;
        };
        let partition = match DataLayout::date_partition(&window_ts) {
            Ok(partition) => partition,
            Err(e) => {
                warn!(dir = %dir_name, error = %e, "cannot derive remote partition");
                return false;
            }
        };

        let dir_path = self.layout.staging_dir().join(dir_name);
        for file_name in list_files(&dir_path) {
            let local_path = dir_path.join(&file_name);
            let relative_file_path = format!("{partition}/{file_name}");
            match self
                .client
                .upload_file(&tenant, &relative_file_path, &local_path)
                .await
            {
                Ok(()) => {
                    if let Err(e) = fs::remove_file(&local_path) {
                        warn!(file = %file_name, error = %e, "cannot delete uploaded file");
                    } else {
                        debug!(file = %file_name, "deleted file after successful upload");
                    }
                }
                Err(e) => {
                    error!(file = %file_name, error = %e, "upload failed");
                    return false;
                }
            }
        }
        true
    }

    fn handle_dir_status(&mut self, dir_name: &str, ok: bool) {
        let dir_path = self.layout.staging_dir().join(dir_name);
        if ok {
            if let Err(e) = fs::remove_dir_all(&dir_path) {
                warn!(dir = %dir_name, error = %e, "cannot delete uploaded directory");
            } else {
                debug!(dir = %dir_name, "deleted directory after successful upload");
            }
            self.retries.remove(dir_name);
            return;
        }

        let attempts = {
            let counter = self.retries.entry(dir_name.to_string()).or_insert(0);
            *counter += 1;
            *counter
        };
        if attempts >= self.max_retries {
            error!(dir = %dir_name, attempts, "max retries exceeded, quarantining");
            let failed_path = self.layout.failed_dir().join(dir_name);
            if let Err(e) = fs::rename(&dir_path, &failed_path) {
                error!(dir = %dir_name, error = %e, "cannot move directory from staging to failed");
            }
            self.retries.remove(dir_name);
        }
    }

    /// Move a bounded batch of quarantined directories back into staging.
    fn recycle_failed(&mut self) {
        for dir_name in list_dirs(self.layout.failed_dir())
            .into_iter()
            .take(self.retry_batch_size)
        {
            let from = self.layout.failed_dir().join(&dir_name);
            let to = self.layout.staging_dir().join(&dir_name);
            if let Err(e) = fs::rename(&from, &to) {
                error!(dir = %dir_name, error = %e, "cannot move directory from failed to staging");
            } else {
                debug!(dir = %dir_name, "recycled quarantined directory for retry");
            }
        }
    }

    /// Current attempt count for a staged directory, for logs and tests.
    pub fn retry_count(&self, dir_name: &str) -> Option<u32> {
        self.retries.get(dir_name).copied()
    }
}

fn list_dirs(path: &std::path::Path) -> Vec<String> {
    list_entries(path, true)
}

fn list_files(path: &std::path::Path) -> Vec<String> {
    list_entries(path, false)
}

fn list_entries(path: &std::path::Path, dirs: bool) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(path) {
        Ok(entries) => entries
            .filter_map(|entry| {
                let entry = entry.ok()?;
                let is_dir = entry.file_type().ok()?.is_dir();
                if is_dir == dirs {
                    Some(entry.file_name().to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot read directory");
            Vec::new()
        }
    };
    names.sort();
    names
}
