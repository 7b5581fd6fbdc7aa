//! Commit log file fixtures
//!
//! [`LogFileBuilder`] lays out a complete commit log (info record followed by
//! entries) using the same framing and codec the reader expects. It is a
//! fixture, not a writer: everything is buffered in memory.
//!
//! # Example
//!
//! ```ignore
//! use quill_commitlog::testing::LogFileBuilder;
//!
//! let mut builder = LogFileBuilder::new(LogFileBuilder::default_info(), 4096)?;
//! builder.metadata_entry(1, "cpu", "metrics", 0, 10, 1.0)?;
//! builder.entry(1, 20, 2.0)?;
//! let spans = builder.write_to(dir.path().join("commitlog.db"))?;
//! ```

use crate::codec::{EntryCodec, LogEntry, LogInfo, LogMetadata, MsgpackCodec};
use crate::error::Result;
use crate::format::{write_record, ChunkSpan, ChunkWriter};
use quill_core::{TimeUnit, Timestamp};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Builds commit log bytes in memory.
pub struct LogFileBuilder {
    codec: MsgpackCodec,
    writer: ChunkWriter<Vec<u8>>,
    chunk_per_record: bool,
    entries: usize,
}

impl LogFileBuilder {
    /// Start a log with `info` as its first record, emitting chunks of at
    /// most `chunk_size` bytes.
    ///
    /// The info record always gets a chunk of its own.
    pub fn new(info: LogInfo, chunk_size: usize) -> Result<Self> {
        let codec = MsgpackCodec::new();
        let mut writer = ChunkWriter::new(Vec::new(), chunk_size);
        write_record(&mut writer, &codec.encode_info(&info)?)?;
        writer.flush()?;
        Ok(LogFileBuilder {
            codec,
            writer,
            chunk_per_record: false,
            entries: 0,
        })
    }

    /// Info header used by most tests.
    pub fn default_info() -> LogInfo {
        LogInfo {
            start: Timestamp::from_secs(1_700_000_000),
            duration: Duration::from_secs(600),
            index: 3,
        }
    }

    /// Flush a chunk after every record, so damaging one chunk damages
    /// exactly one record.
    pub fn chunk_per_record(mut self) -> Self {
        self.chunk_per_record = true;
        self
    }

    /// Append a metadata-bearing entry.
    pub fn metadata_entry(
        &mut self,
        unique_index: u64,
        id: &str,
        namespace: &str,
        shard: u32,
        timestamp: i64,
        value: f64,
    ) -> Result<&mut Self> {
        let metadata = self.codec.encode_metadata(&LogMetadata {
            id: id.as_bytes().to_vec(),
            namespace: namespace.as_bytes().to_vec(),
            shard,
        })?;
        self.push(&LogEntry {
            unique_index,
            timestamp,
            value,
            unit: TimeUnit::Second.as_byte(),
            annotation: Vec::new(),
            metadata,
        })
    }

    /// Append a datapoint-only entry.
    pub fn entry(&mut self, unique_index: u64, timestamp: i64, value: f64) -> Result<&mut Self> {
        self.push(&LogEntry {
            unique_index,
            timestamp,
            value,
            unit: TimeUnit::Second.as_byte(),
            annotation: Vec::new(),
            metadata: Vec::new(),
        })
    }

    /// Append an arbitrary entry.
    pub fn push(&mut self, entry: &LogEntry) -> Result<&mut Self> {
        let bytes = self.codec.encode_entry(entry)?;
        self.raw_record(&bytes)
    }

    /// Append a record payload without encoding it.
    pub fn raw_record(&mut self, payload: &[u8]) -> Result<&mut Self> {
        write_record(&mut self.writer, payload)?;
        if self.chunk_per_record {
            self.writer.flush()?;
        }
        self.entries += 1;
        Ok(self)
    }

    /// Records appended after the info header.
    pub fn len(&self) -> usize {
        self.entries
    }

    /// True if only the info header has been written.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Finish the log, returning its bytes and the chunk layout.
    ///
    /// The first span is always the info record's chunk.
    pub fn finish(self) -> Result<(Vec<u8>, Vec<ChunkSpan>)> {
        Ok(self.writer.into_inner()?)
    }

    /// Finish the log and write it to `path`.
    pub fn write_to(self, path: impl AsRef<Path>) -> Result<Vec<ChunkSpan>> {
        let (bytes, spans) = self.finish()?;
        std::fs::write(path, bytes)?;
        Ok(spans)
    }
}
