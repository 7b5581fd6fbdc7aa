//! Commit log reader integration tests
//!
//! These tests drive the full pipeline over real files:
//! - Series resolution and per-series ordering
//! - Error isolation (missing metadata, corrupt and truncated chunks)
//! - Predicate filtering
//! - Reader lifecycle (reuse, close before and during reading)

use quill_commitlog::format::ChecksumKind;
use quill_commitlog::testing::LogFileBuilder;
use quill_commitlog::{
    in_namespace, read_all_series, CommitLogError, CommitLogReader, LogRecord, ReaderOptions,
    ReaderOptionsError, SeriesPredicate,
};
use quill_core::{Ident, TimeUnit};
use rand::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn log_path(dir: &TempDir) -> PathBuf {
    dir.path().join("commitlog-0-3.db")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn reader(predicate: SeriesPredicate) -> CommitLogReader {
    init_tracing();
    CommitLogReader::new(ReaderOptions::for_testing(), predicate).unwrap()
}

/// Read until end of stream, splitting records from errors.
fn drain(reader: &CommitLogReader) -> (Vec<LogRecord>, Vec<CommitLogError>) {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    loop {
        match reader.read() {
            Ok(record) => records.push(record),
            Err(e) if e.is_end_of_stream() => break,
            Err(e) => errors.push(e),
        }
    }
    (records, errors)
}

fn timestamps_by_index(records: &[LogRecord]) -> HashMap<u64, Vec<i64>> {
    let mut by_index: HashMap<u64, Vec<i64>> = HashMap::new();
    for record in records {
        by_index
            .entry(record.unique_index)
            .or_default()
            .push(record.datapoint.timestamp.as_nanos());
    }
    by_index
}

#[test]
fn test_reads_every_record_with_resolved_series() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(1, "cpu", "metrics", 7, 1, 0.5).unwrap();
    builder.metadata_entry(2, "mem", "metrics", 8, 2, 1.5).unwrap();
    builder.entry(1, 3, 2.5).unwrap();
    builder.entry(2, 4, 3.5).unwrap();
    builder.write_to(&path).unwrap();

    let reader = reader(read_all_series());
    let info = reader.open(&path).unwrap();
    assert_eq!(info, LogFileBuilder::default_info());

    let (records, errors) = drain(&reader);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert_eq!(records.len(), 4);
    assert_eq!(reader.records_read(), 4);

    for record in &records {
        let (id, shard) = match record.unique_index {
            1 => ("cpu", 7),
            2 => ("mem", 8),
            other => panic!("unexpected index {}", other),
        };
        assert_eq!(record.series.id, Ident::from(id));
        assert_eq!(record.series.namespace, Ident::from("metrics"));
        assert_eq!(record.series.shard, shard);
        assert_eq!(record.series.unique_index, record.unique_index);
        assert_eq!(record.unit, TimeUnit::Second);
        assert!(record.annotation.is_empty());
    }

    // Stream stays ended.
    assert!(reader.read().unwrap_err().is_end_of_stream());
    reader.close().unwrap();
}

#[test]
fn test_per_series_order_is_preserved() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    // A1, B1, B2, A2, C1, D1, D2, A3, B3 with many more points per series.
    let pattern = [1u64, 2, 2, 1, 3, 4, 4, 1, 2];
    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 512).unwrap();
    let mut seen = std::collections::HashSet::new();
    let mut expected: HashMap<u64, Vec<i64>> = HashMap::new();
    for round in 0..50i64 {
        for (i, index) in pattern.iter().enumerate() {
            let ts = round * 100 + i as i64;
            if seen.insert(*index) {
                let id = format!("series-{}", index);
                builder.metadata_entry(*index, &id, "ns", 0, ts, 0.0).unwrap();
            } else {
                builder.entry(*index, ts, 0.0).unwrap();
            }
            expected.entry(*index).or_default().push(ts);
        }
    }
    builder.write_to(&path).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);
    assert!(errors.is_empty());
    assert_eq!(records.len(), 50 * pattern.len());
    assert_eq!(timestamps_by_index(&records), expected);
}

#[test]
fn test_missing_metadata_is_isolated() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(1, "a", "ns", 0, 1, 1.0).unwrap();
    builder.entry(2, 2, 2.0).unwrap();
    builder.entry(1, 3, 3.0).unwrap();
    builder.write_to(&path).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.series.id == Ident::from("a")));
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        CommitLogError::MissingMetadata { unique_index: 2 }
    ));
}

#[test]
fn test_predicate_filters_series() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(1, "a", "ns-a", 0, 1, 1.0).unwrap();
    builder.metadata_entry(2, "b", "ns-b", 0, 2, 2.0).unwrap();
    for ts in 3..20 {
        builder.entry(1 + (ts as u64 % 2), ts, ts as f64).unwrap();
    }
    builder.write_to(&path).unwrap();

    let reader = reader(in_namespace("ns-b"));
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    assert!(errors.is_empty());
    assert_eq!(records.len(), 1 + 9);
    assert!(records.iter().all(|r| r.series.id == Ident::from("b")));
}

#[test]
fn test_predicate_runs_once_per_series() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    for index in 0..6u64 {
        builder.metadata_entry(index, "s", "ns", 0, 0, 0.0).unwrap();
        builder.entry(index, 1, 0.0).unwrap();
    }
    builder.write_to(&path).unwrap();

    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let predicate: SeriesPredicate = {
        let calls = Arc::clone(&calls);
        Arc::new(move |_: &Ident, _: &Ident| {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        })
    };

    let reader = reader(predicate);
    reader.open(&path).unwrap();
    let (records, _) = drain(&reader);
    assert_eq!(records.len(), 12);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 6);
}

#[test]
fn test_duplicate_metadata_first_writer_wins() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(5, "first", "ns", 1, 1, 1.0).unwrap();
    builder.metadata_entry(5, "second", "other", 2, 2, 2.0).unwrap();
    builder.entry(5, 3, 3.0).unwrap();
    builder.write_to(&path).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    assert!(errors.is_empty());
    assert_eq!(records.len(), 3);
    for record in &records {
        assert_eq!(record.series.id, Ident::from("first"));
        assert_eq!(record.series.namespace, Ident::from("ns"));
        assert_eq!(record.series.shard, 1);
    }
}

#[test]
fn test_corrupt_chunk_mid_file_then_clean_end() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256)
        .unwrap()
        .chunk_per_record();
    builder.metadata_entry(1, "a", "ns", 0, 0, 0.0).unwrap();
    for ts in 1..5 {
        builder.entry(1, ts, 0.0).unwrap();
    }
    let (mut bytes, spans) = builder.finish().unwrap();
    assert_eq!(spans.len(), 6);

    // Flip a payload byte of the third entry's chunk.
    let span = spans[3];
    let offset = span.payload_offset() as usize + span.len / 2;
    bytes[offset] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        CommitLogError::ChunkChecksumMismatch(ChecksumKind::Payload)
    ));
    let timestamps: Vec<i64> = records
        .iter()
        .map(|r| r.datapoint.timestamp.as_nanos())
        .collect();
    // Nothing after the damaged chunk is delivered.
    assert_eq!(timestamps, vec![0, 1]);
}

#[test]
fn test_corrupt_chunk_in_packed_layout_ends_stream() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    // Small chunks so most records straddle a chunk boundary.
    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 64).unwrap();
    let mut expected: HashMap<u64, Vec<i64>> = HashMap::new();
    for index in 0..8u64 {
        let id = format!("series-{}", index);
        builder.metadata_entry(index, &id, "ns", 0, 0, 0.0).unwrap();
        expected.entry(index).or_default().push(0);
    }
    for ts in 1..200i64 {
        let index = ts as u64 % 8;
        builder.entry(index, ts, ts as f64).unwrap();
        expected.entry(index).or_default().push(ts);
    }
    let (clean, spans) = builder.finish().unwrap();
    assert!(spans.len() > 30);

    // Damage each entry chunk in turn; span 0 is the info record.
    for (k, span) in spans.iter().enumerate().skip(1) {
        let mut bytes = clean.clone();
        bytes[span.payload_offset() as usize] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let reader = reader(read_all_series());
        reader.open(&path).unwrap();
        let (records, errors) = drain(&reader);

        assert_eq!(errors.len(), 1, "chunk {}: {:?}", k, errors);
        assert!(matches!(
            errors[0],
            CommitLogError::ChunkChecksumMismatch(ChecksumKind::Payload)
        ));
        // Each series gets a prefix of its points, in order.
        for (index, timestamps) in timestamps_by_index(&records) {
            let all = &expected[&index];
            assert_eq!(&all[..timestamps.len()], timestamps.as_slice(), "chunk {}", k);
        }
        assert!(reader.read().unwrap_err().is_end_of_stream());
    }
}

#[test]
fn test_truncated_file_reports_then_ends() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256)
        .unwrap()
        .chunk_per_record();
    builder.metadata_entry(1, "a", "ns", 0, 0, 0.0).unwrap();
    builder.entry(1, 1, 0.0).unwrap();
    builder.entry(1, 2, 0.0).unwrap();
    let (bytes, spans) = builder.finish().unwrap();

    // Cut the last chunk in half.
    let last = spans[spans.len() - 1];
    let cut = last.payload_offset() as usize + last.len / 2;
    std::fs::write(&path, &bytes[..cut]).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    assert_eq!(records.len(), 2);
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], CommitLogError::Truncated));
}

#[test]
fn test_open_rejects_damaged_info_record() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    let (mut bytes, spans) = builder.finish().unwrap();
    let offset = spans[0].payload_offset() as usize + 1;
    bytes[offset] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let reader = reader(read_all_series());
    assert!(matches!(
        reader.open(&path),
        Err(CommitLogError::ChunkChecksumMismatch(ChecksumKind::Payload))
    ));
    // The failed open still consumed the reader.
    assert!(matches!(reader.open(&path), Err(CommitLogError::NotReusable)));
    assert!(matches!(reader.read(), Err(CommitLogError::Closed)));
}

#[test]
fn test_open_empty_file_is_truncated() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    std::fs::write(&path, b"").unwrap();

    let reader = reader(read_all_series());
    assert!(matches!(reader.open(&path), Err(CommitLogError::Truncated)));
}

#[test]
fn test_reader_is_not_reusable() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    LogFileBuilder::new(LogFileBuilder::default_info(), 256)
        .unwrap()
        .write_to(&path)
        .unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    assert!(matches!(reader.open(&path), Err(CommitLogError::NotReusable)));
}

#[test]
fn test_open_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let reader = reader(read_all_series());
    assert!(matches!(
        reader.open(dir.path().join("missing.db")),
        Err(CommitLogError::Io(_))
    ));
}

#[test]
fn test_read_before_open() {
    let reader = reader(read_all_series());
    assert!(matches!(reader.read(), Err(CommitLogError::NotOpened)));
}

#[test]
fn test_close_before_read() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(1, "a", "ns", 0, 0, 0.0).unwrap();
    builder.write_to(&path).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    reader.close().unwrap();
    reader.close().unwrap();
    assert!(matches!(reader.read(), Err(CommitLogError::Closed)));
}

#[test]
fn test_close_during_active_reading_is_bounded() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 4096).unwrap();
    for index in 0..2000u64 {
        let id = format!("series-{}", index);
        builder.metadata_entry(index, &id, "ns", 0, 0, 0.0).unwrap();
    }
    builder.write_to(&path).unwrap();

    let slow: SeriesPredicate = Arc::new(|_: &Ident, _: &Ident| {
        std::thread::sleep(Duration::from_millis(2));
        true
    });
    let reader = reader(slow);
    reader.open(&path).unwrap();
    for _ in 0..5 {
        reader.read().unwrap();
    }

    let started = Instant::now();
    reader.close().unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "close took {:?}",
        started.elapsed()
    );
    assert_eq!(reader.records_read(), 5);
}

#[test]
fn test_drop_without_close() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    for index in 0..100u64 {
        builder.metadata_entry(index, "s", "ns", 0, 0, 0.0).unwrap();
    }
    builder.write_to(&path).unwrap();

    let reader = reader(read_all_series());
    reader.open(&path).unwrap();
    reader.read().unwrap();
    drop(reader);
}

#[test]
fn test_iterator_yields_until_end() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(1, "a", "ns", 0, 0, 0.0).unwrap();
    builder.entry(1, 1, 1.0).unwrap();
    builder.entry(9, 2, 2.0).unwrap();
    builder.write_to(&path).unwrap();

    let mut reader = reader(read_all_series());
    reader.open(&path).unwrap();
    let results: Vec<_> = reader.by_ref().collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    assert!(reader.next().is_none());
}

#[test]
fn test_single_worker_reader() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 256).unwrap();
    builder.metadata_entry(1, "a", "ns", 0, 0, 0.0).unwrap();
    builder.metadata_entry(2, "b", "ns", 0, 1, 0.0).unwrap();
    builder.entry(2, 2, 0.0).unwrap();
    builder.entry(1, 3, 0.0).unwrap();
    builder.write_to(&path).unwrap();

    let options = ReaderOptions::for_testing().with_read_concurrency(1);
    let reader = CommitLogReader::new(options, read_all_series()).unwrap();
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    // One worker sees everything in file order.
    assert!(errors.is_empty());
    let timestamps: Vec<i64> = records
        .iter()
        .map(|r| r.datapoint.timestamp.as_nanos())
        .collect();
    assert_eq!(timestamps, vec![0, 1, 2, 3]);
}

#[test]
fn test_invalid_options_rejected() {
    let options = ReaderOptions::for_testing().with_read_concurrency(0);
    assert!(matches!(
        CommitLogReader::new(options, read_all_series()),
        Err(CommitLogError::Options(ReaderOptionsError::ZeroConcurrency))
    ));

    let options = ReaderOptions::for_testing().with_codec("protobuf");
    assert!(matches!(
        CommitLogReader::new(options, read_all_series()),
        Err(CommitLogError::Codec(_))
    ));
}

#[test]
fn test_random_interleaving_many_workers() {
    let dir = TempDir::new().unwrap();
    let path = log_path(&dir);
    let mut rng = rand::thread_rng();

    let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 1024).unwrap();
    let mut expected: HashMap<u64, Vec<i64>> = HashMap::new();
    for index in 0..32u64 {
        builder.metadata_entry(index, "s", "ns", 0, 0, 0.0).unwrap();
        expected.entry(index).or_default().push(0);
    }
    for ts in 1..2000i64 {
        let index = rng.gen_range(0..32u64);
        builder.entry(index, ts, rng.gen()).unwrap();
        expected.entry(index).or_default().push(ts);
    }
    builder.write_to(&path).unwrap();

    let options = ReaderOptions::for_testing().with_read_concurrency(7);
    let reader = CommitLogReader::new(options, read_all_series()).unwrap();
    reader.open(&path).unwrap();
    let (records, errors) = drain(&reader);

    assert!(errors.is_empty());
    assert_eq!(timestamps_by_index(&records), expected);
}
