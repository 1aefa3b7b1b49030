//! Crash Recovery
//!
//! A process crash leaves open windows behind: directories still in tmp/
//! whose gzip files were flushed but never finalized, so their final frame
//! is missing and they are not valid archives. Recovery restores them to
//! uploadable state in two phases:
//!
//! 1. **Synchronous quarantine** (before new windows are accepted): every
//!    leftover tmp/ directory is renamed into recovered/ with a
//!    `~recoveredTS~<repairTS>` suffix, so new activity cannot collide with
//!    the repair and repeated crashes stack distinguishable suffixes.
//! 2. **Asynchronous repair** (after a short delay, off the startup path):
//!    each file is re-read as a gzip stream line by line; every complete
//!    line is copied into a new, correctly finalized gzip file and the
//!    original is deleted. A trailing partial line is dropped silently;
//!    the writer had not flushed it as a complete record. Repaired
//!    directories move to staging/, where the upload manager treats them
//!    like any normally sealed window.
//!
//! Unreadable files are logged and skipped without blocking their siblings;
//! a directory whose final rename fails stays in recovered/ for the next
//! startup's pass.

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, StorageError};
use crate::layout::{DataLayout, FILE_EXTENSION, RECOVERED_MARKER};

pub struct CrashRecovery {
    layout: DataLayout,
    delay: Duration,
}

impl CrashRecovery {
    pub fn new(layout: DataLayout, delay: Duration) -> Self {
        Self { layout, delay }
    }

    /// Recovery is needed iff tmp/ holds leftover windows (unclean shutdown)
    /// or recovered/ is non-empty (a prior repair did not finish).
    pub fn recovery_needed(&self) -> bool {
        !list_dirs(self.layout.tmp_dir()).is_empty()
            || !list_dirs(self.layout.recovered_dir()).is_empty()
    }

    /// Decide synchronously, quarantine synchronously, repair later.
    ///
    /// Returns the repair task handle when recovery was started, so callers
    /// (and tests) can await completion.
    pub fn start(self) -> Option<JoinHandle<()>> {
        if !self.recovery_needed() {
            return None;
        }
        info!(
            delay_secs = self.delay.as_secs(),
            "crash recovery is needed and will be attempted after the delay"
        );

        self.quarantine_open_windows();

        Some(tokio::spawn(async move {
            tokio::time::sleep(self.delay).await;
            let layout = self.layout.clone();
            // The repair is pure streaming file I/O.
            let result = tokio::task::spawn_blocking(move || perform_recovery(&layout)).await;
            if result.is_err() {
                error!("crash repair task panicked");
            }
        }))
    }

    /// Phase 1: move every leftover open window into the recovery area.
    fn quarantine_open_windows(&self) {
        let repair_ts = DataLayout::recovery_ts_now();
        for dir_name in list_dirs(self.layout.tmp_dir()) {
            debug!(dir = %dir_name, "moving window from tmp to recovered");
            let from = self.layout.tmp_dir().join(&dir_name);
            let new_name = DataLayout::recovered_dir_name(&dir_name, &repair_ts);
            let to = self.layout.recovered_dir().join(&new_name);
            if let Err(e) = fs::rename(&from, &to) {
                error!(dir = %dir_name, error = %e, "cannot move window from tmp to recovered");
            }
        }
    }
}

/// Phase 2: repair every directory sitting in the recovery area.
pub fn perform_recovery(layout: &DataLayout) {
    info!("crash recovery is starting");
    for dir_name in list_dirs(layout.recovered_dir()) {
        recover_directory(layout, &dir_name);
    }
    info!("crash recovery complete");
}

fn recover_directory(layout: &DataLayout, dir_name: &str) {
    info!(dir = %dir_name, "performing crash recovery for directory");

    // `o~e~TS~recoveredTS~20160101222612.123` → file suffix `_20160101222612.123`
    let repair_suffix = dir_name
        .find(RECOVERED_MARKER)
        .map(|idx| format!("_{}", &dir_name[idx + RECOVERED_MARKER.len()..]))
        .unwrap_or_default();

    let dir_path = layout.recovered_dir().join(dir_name);
    for file_name in list_files(&dir_path) {
        recover_file(&dir_path, &file_name, &repair_suffix);
    }

    let staging_path = layout.staging_dir().join(dir_name);
    if let Err(e) = fs::rename(&dir_path, &staging_path) {
        // Stays in recovered/ for the next startup.
        error!(dir = %dir_name, error = %e, "cannot move directory from recovered to staging");
    }
}

fn recover_file(dir_path: &Path, file_name: &str, repair_suffix: &str) {
    debug!(file = %file_name, "performing crash recovery for file");

    let stem = file_name.strip_suffix(FILE_EXTENSION).unwrap_or(file_name);
    let recovered_name = format!("{stem}_recovered{repair_suffix}{FILE_EXTENSION}");

    let orig_path = dir_path.join(file_name);
    let recovered_path = dir_path.join(&recovered_name);

    match copy_complete_lines(&orig_path, &recovered_path) {
        Ok(lines) => {
            debug!(file = %file_name, lines, "copied complete records into recovered file");
            if let Err(e) = fs::remove_file(&orig_path) {
                error!(file = %file_name, error = %e, "cannot delete partial file");
            }
        }
        Err(e) => {
            // Skipped; sibling files still get processed.
            warn!(file = %file_name, error = %e, "cannot recover file");
        }
    }
}

/// Copy every fully-read line of a (possibly truncated) gzip stream into a
/// new, correctly finalized gzip file. Returns the number of lines kept.
fn copy_complete_lines(src: &Path, dst: &Path) -> Result<usize> {
    let file = File::open(src).map_err(|source| StorageError::CannotReadFile {
        path: src.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));

    // Probe the stream before creating the output file: a file that cannot
    // be read as gzip at all is skipped, not replaced with an empty archive.
    reader
        .fill_buf()
        .map_err(|source| StorageError::CannotReadFile {
            path: src.to_path_buf(),
            source,
        })?;

    let out = File::create(dst).map_err(|source| StorageError::CannotCreateFile {
        path: dst.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(GzEncoder::new(out, Compression::default()));

    let mut kept = 0usize;
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) if line.ends_with(b"\n") => {
                writer.write_all(&line)?;
                kept += 1;
            }
            // Trailing partial line: the writer never flushed it as a
            // complete record.
            Ok(_) => break,
            Err(e) => {
                // Corrupt or truncated tail; everything before it is kept.
                debug!(file = %src.display(), error = %e, "stopped reading at corrupt tail");
                break;
            }
        }
    }

    writer.flush()?;
    let encoder = writer
        .into_inner()
        .map_err(|e| StorageError::Io(e.into_error()))?;
    encoder.finish()?;
    Ok(kept)
}

fn list_dirs(path: &Path) -> Vec<String> {
    list_entries(path, true)
}

fn list_files(path: &Path) -> Vec<String> {
    list_entries(path, false)
}

fn list_entries(path: &Path, dirs: bool) -> Vec<String> {
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
            warn!(path = %path.display(), error = %e, "cannot read directory");
            Vec::new()
        }
    };
    names.sort();
    names
}
