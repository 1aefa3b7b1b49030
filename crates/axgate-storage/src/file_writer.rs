//! Gzip line writer.
//!
//! One open compressed file per window writer. Records are appended as
//! newline-delimited JSON through a buffered stream stacked over the
//! compressor; `flush()` pushes everything through to the file with a sync
//! flush (the gzip frame stays open), `close()` finalizes the frame.
//!
//! A file that was flushed but never closed is not a valid standalone
//! archive, because its final frame is missing. That is the exact state crash
//! recovery repairs on the next startup, which is why `close()` must run
//! exactly once per window on every clean path.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use axgate_core::Record;

use crate::error::{Result, StorageError};

#[derive(Debug)]
pub struct GzipLineWriter {
    path: PathBuf,
    out: BufWriter<GzEncoder<File>>,
}

impl GzipLineWriter {
    /// Create the file and stack the buffered, compressing stream on it.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| StorageError::CannotCreateFile {
            path: path.clone(),
            source,
        })?;
        let encoder = GzEncoder::new(file, Compression::default());
        Ok(Self {
            path,
            out: BufWriter::new(encoder),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize one record as a single JSON line.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Force buffered data through the compressor to the file.
    ///
    /// Called once per batch, not per record, trading some compression
    /// efficiency for durability of everything written so far.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    /// Flush, finalize the gzip frame, and close the file.
    pub fn close(mut self) -> Result<()> {
        self.out.flush()?;
        let encoder = self
            .out
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        encoder.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    fn record(i: u64) -> Record {
        let mut r = Record::new();
        r.insert("seq".to_string(), json!(i));
        r
    }

    #[test]
    fn closed_file_is_a_valid_archive_with_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.txt.gz");

        let mut writer = GzipLineWriter::create(&path).unwrap();
        for i in 0..3 {
            writer.append(&record(i)).unwrap();
        }
        writer.flush().unwrap();
        writer.close().unwrap();

        let mut decoder = GzDecoder::new(File::open(&path).unwrap());
        let mut contents = String::new();
        decoder.read_to_string(&mut contents).unwrap();

        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: Record = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["seq"], json!(0));
    }

    #[test]
    fn create_in_missing_directory_is_cannot_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = GzipLineWriter::create(dir.path().join("nope").join("w.txt.gz")).unwrap_err();
        assert!(matches!(err, StorageError::CannotCreateFile { .. }));
    }
}
