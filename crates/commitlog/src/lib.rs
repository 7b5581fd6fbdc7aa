//! Commit log reader for Quill
//!
//! This crate reads commit log files back into per-series datapoints:
//!
//! - Framing: checksum-protected chunks carrying length-prefixed records
//! - Codec: entry codec abstraction with a MessagePack implementation
//! - Reader: one read loop fanning records out to N decode workers
//! - Buffer pools bounding the bytes in flight per worker
//! - Reader options loadable from TOML
//! - Test fixtures for laying out commit log files
//!
//! # Example
//!
//! ```ignore
//! use quill_commitlog::{read_all_series, CommitLogReader, ReaderOptions};
//!
//! let reader = CommitLogReader::new(ReaderOptions::default(), read_all_series())?;
//! let info = reader.open("commitlog-0-1.db")?;
//! for record in reader {
//!     let record = record?;
//!     println!("{} {}", record.series.id, record.datapoint.value);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec; // Entry codec trait and MessagePack implementation
pub mod config; // Reader options
pub mod error; // CommitLogError
pub mod format; // Chunk and record framing
pub mod pool; // Per-worker buffer pools
pub mod predicate; // Series filters
pub mod reader; // CommitLogReader pipeline
pub mod testing; // Commit log file fixtures

// === Re-exports ===
pub use codec::{get_codec, CodecError, EntryCodec, LogEntry, LogInfo, LogMetadata, MsgpackCodec};
pub use config::{ReaderOptions, ReaderOptionsError};
pub use error::{CommitLogError, Result};
pub use predicate::{in_namespace, read_all_series, SeriesPredicate};
pub use reader::{CommitLogReader, LogRecord, ReadResponse};
