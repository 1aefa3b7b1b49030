//! End-to-end collector tests: ingest queue → window file → staging.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axgate_core::{enrich_record, validate_batch, RecordBatch};
use axgate_metadata::{LookasideCache, SqliteScopeStore};
use axgate_storage::{Collector, CollectorConfig};
use chrono::Utc;
use flate2::read::MultiGzDecoder;
use serde_json::json;
use tempfile::TempDir;

fn test_config(base: &TempDir, interval_secs: u64, grace_secs: u64) -> CollectorConfig {
    CollectorConfig {
        base_dir: base.path().to_path_buf(),
        collection_endpoint: "http://localhost:0".to_string(),
        instance_id: "test-instance".to_string(),
        collection_interval_secs: interval_secs,
        close_grace_secs: grace_secs,
        ..Default::default()
    }
}

/// Read every complete line out of a gzip file, tolerating an unfinalized
/// final frame (the file may still be open for writing).
fn read_complete_lines(path: &Path) -> Vec<String> {
    let mut reader = BufReader::new(MultiGzDecoder::new(File::open(path).unwrap()));
    let mut lines = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line.ends_with('\n') => lines.push(line.trim_end().to_string()),
            _ => break,
        }
    }
    lines
}

fn single_subdir(path: &Path) -> std::path::PathBuf {
    let mut entries: Vec<_> = std::fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "expected exactly one entry in {}", path.display());
    entries.remove(0)
}

#[tokio::test]
async fn round_trip_batch_lands_enriched_then_stages_after_expiry() {
    let base = TempDir::new().unwrap();
    // 2-second windows so the test can observe the full lifecycle.
    let config = test_config(&base, 2, 1);
    let collector = Collector::start(&config).unwrap();

    // Resolve the tenant the way the ingest layer would.
    let store = SqliteScopeStore::new_in_memory().await.unwrap();
    store
        .upsert_scope(
            "testid",
            &axgate_core::Tenant::new("testorg", "testenv", "tenant-1"),
        )
        .await
        .unwrap();
    let cache = LookasideCache::new(Arc::new(store), true);
    let tenant = cache.get_tenant("testid").await.unwrap();

    let now_ms = Utc::now().timestamp_millis();
    let mut record = axgate_core::Record::new();
    record.insert(
        "client_received_start_timestamp".to_string(),
        json!(now_ms),
    );
    record.insert(
        "client_received_end_timestamp".to_string(),
        json!(now_ms + 1000),
    );

    validate_batch(std::slice::from_ref(&record)).unwrap();
    enrich_record(&mut record, &tenant, None);

    collector
        .submit(RecordBatch::new(tenant, vec![record]))
        .await
        .unwrap();

    // Let the drain task write the batch.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let window_dir = single_subdir(&base.path().join("tmp"));
    let dir_name = window_dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(dir_name.starts_with("testorg~testenv~"));

    let file_path = single_subdir(&window_dir);
    let lines = read_complete_lines(&file_path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("\"organization\":\"testorg\""));
    assert!(lines[0].contains("\"environment\":\"testenv\""));

    // Window end + grace, with margin for the timer to fire.
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert!(
        base.path().join("staging").join(&dir_name).exists(),
        "window should be relocated to staging after expiry"
    );
    assert!(!window_dir.exists());

    collector.shutdown().await;
}

#[tokio::test]
async fn shutdown_seals_open_windows_without_waiting_for_timers() {
    let base = TempDir::new().unwrap();
    // Long windows: only shutdown can stage them within the test.
    let config = test_config(&base, 120, 5);
    let collector = Collector::start(&config).unwrap();

    let tenant = axgate_core::Tenant::new("testorg", "testenv", "t1");
    let mut record = axgate_core::Record::new();
    record.insert("client_received_start_timestamp".to_string(), json!(1000));
    record.insert("client_received_end_timestamp".to_string(), json!(2000));

    collector
        .submit(RecordBatch::new(tenant, vec![record]))
        .await
        .unwrap();

    collector.shutdown().await;

    let staged = single_subdir(&base.path().join("staging"));
    let file_path = single_subdir(&staged);

    // After shutdown the file is a finalized archive.
    let lines = read_complete_lines(&file_path);
    assert_eq!(lines.len(), 1);

    let tmp_entries: Vec<_> = std::fs::read_dir(base.path().join("tmp")).unwrap().collect();
    assert!(tmp_entries.is_empty(), "no window left behind in tmp");
}
