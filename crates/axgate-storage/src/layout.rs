//! Filesystem layout and naming.
//!
//! Everything under the base directory is driven by directory renames, which
//! the host OS makes atomic. The four areas form the window state machine:
//!
//! ```text
//! tmp/       open windows, one directory per (tenant, window start)
//! staging/   sealed windows awaiting upload
//! recovered/ windows undergoing crash repair
//! failed/    windows that exhausted their upload retries
//! ```
//!
//! Names are the contract between the subsystems: the bucket manager writes
//! them, crash recovery rewrites them, and the upload manager parses them
//! back into (tenant, partition) coordinates.

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Result, StorageError};

/// Extension of every buffered data file.
pub const FILE_EXTENSION: &str = ".txt.gz";

/// Fixed-width timestamp layout (`yyyyMMddHHmmss`); names sort chronologically.
pub const TIMESTAMP_LAYOUT: &str = "%Y%m%d%H%M%S";

/// Repair-timestamp layout, millisecond precision (`yyyyMMddHHmmss.SSS`).
pub const RECOVERY_TS_LAYOUT: &str = "%Y%m%d%H%M%S%.3f";

/// Marker spliced into directory names moved into the recovery area.
pub const RECOVERED_MARKER: &str = "~recoveredTS~";

#[derive(Debug, Clone)]
pub struct DataLayout {
    base: PathBuf,
    tmp: PathBuf,
    staging: PathBuf,
    failed: PathBuf,
    recovered: PathBuf,
}

impl DataLayout {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        let base = base_dir.as_ref().to_path_buf();
        Self {
            tmp: base.join("tmp"),
            staging: base.join("staging"),
            failed: base.join("failed"),
            recovered: base.join("recovered"),
            base,
        }
    }

    /// Create any missing area directories.
    pub fn create_all(&self) -> Result<()> {
        for path in [
            &self.base,
            &self.tmp,
            &self.staging,
            &self.failed,
            &self.recovered,
        ] {
            if !path.exists() {
                fs::create_dir_all(path).map_err(|source| StorageError::CannotCreateDir {
                    path: path.clone(),
                    source,
                })?;
                info!(path = %path.display(), "created analytics buffering directory");
            }
        }
        Ok(())
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging
    }

    pub fn failed_dir(&self) -> &Path {
        &self.failed
    }

    pub fn recovered_dir(&self) -> &Path {
        &self.recovered
    }

    /// Format a unix timestamp with the fixed-width window layout.
    pub fn format_ts(ts: i64) -> Result<String> {
        let dt = DateTime::<Utc>::from_timestamp(ts, 0)
            .ok_or_else(|| StorageError::InvalidTimestamp(ts.to_string()))?;
        Ok(dt.format(TIMESTAMP_LAYOUT).to_string())
    }

    /// Window directory name: `<org>~<env>~<windowStartTS>`.
    pub fn window_dir_name(tenant_key: &str, window_start: i64) -> Result<String> {
        Ok(format!("{}~{}", tenant_key, Self::format_ts(window_start)?))
    }

    /// Data file name:
    /// `<4-hex>_<startTS>.<endTS>_<instanceId>_writer_0.txt.gz`.
    ///
    /// The random prefix spreads destination keys across remote-store
    /// partitions; start/end plus instance id keep files from distinct
    /// writers of the same window from colliding.
    pub fn file_name(window_start: i64, window_end: i64, instance_id: &str) -> Result<String> {
        Ok(format!(
            "{}_{}.{}_{}_writer_0{}",
            random_hex(),
            Self::format_ts(window_start)?,
            Self::format_ts(window_end)?,
            instance_id,
            FILE_EXTENSION
        ))
    }

    /// Split a window directory name into (`org~env`, window timestamp).
    pub fn split_dir_name(dir_name: &str) -> Option<(String, String)> {
        let mut parts = dir_name.split('~');
        let org = parts.next()?;
        let env = parts.next()?;
        let ts = parts.next()?;
        Some((format!("{org}~{env}"), ts.to_string()))
    }

    /// Remote partition key for a window timestamp:
    /// `date=YYYY-MM-dd/time=HH-mm-ss`.
    pub fn date_partition(window_ts: &str) -> Result<String> {
        let dt = NaiveDateTime::parse_from_str(window_ts, TIMESTAMP_LAYOUT)
            .map_err(|_| StorageError::InvalidTimestamp(window_ts.to_string()))?;
        Ok(format!(
            "date={}/time={}",
            dt.format("%Y-%m-%d"),
            dt.format("%H-%M-%S")
        ))
    }

    /// Name of a directory moved into the recovery area:
    /// `<window-dir>~recoveredTS~<repairTS>`. Repeated crashes stack
    /// distinguishable suffixes.
    pub fn recovered_dir_name(dir_name: &str, repair_ts: &str) -> String {
        format!("{dir_name}{RECOVERED_MARKER}{repair_ts}")
    }

    /// Timestamp for the current repair attempt.
    pub fn recovery_ts_now() -> String {
        Utc::now().format(RECOVERY_TS_LAYOUT).to_string()
    }
}

/// 4-digit hex prefix for data files.
pub fn random_hex() -> String {
    let n: u16 = rand::thread_rng().gen();
    format!("{n:04x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_dir_name_embeds_tenant_and_timestamp() {
        // 2016-01-01 22:40:00 UTC
        let name = DataLayout::window_dir_name("testorg~testenv", 1451688000).unwrap();
        assert_eq!(name, "testorg~testenv~20160101224000");
    }

    #[test]
    fn split_dir_name_round_trips() {
        let (tenant, ts) = DataLayout::split_dir_name("testorg~testenv~20160101224500").unwrap();
        assert_eq!(tenant, "testorg~testenv");
        assert_eq!(ts, "20160101224500");
    }

    #[test]
    fn split_rejects_malformed_names() {
        assert!(DataLayout::split_dir_name("no-separators").is_none());
    }

    #[test]
    fn date_partition_matches_remote_key_shape() {
        let partition = DataLayout::date_partition("20160101224500").unwrap();
        assert_eq!(partition, "date=2016-01-01/time=22-45-00");
    }

    #[test]
    fn file_name_carries_window_bounds_and_instance() {
        let name = DataLayout::file_name(1451688000, 1451688120, "inst-1").unwrap();
        assert!(name.ends_with("_writer_0.txt.gz"));
        assert!(name.contains("_20160101224000.20160101224200_inst-1"));
        // 4-hex prefix plus underscore
        assert_eq!(name.as_bytes()[4], b'_');
    }

    #[test]
    fn recovered_name_stacks_marker() {
        let name = DataLayout::recovered_dir_name("o~e~20160101224500", "20160101224612.123");
        assert_eq!(name, "o~e~20160101224500~recoveredTS~20160101224612.123");
    }
}
