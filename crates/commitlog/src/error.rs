//! Commit log reader error types.

use crate::codec::CodecError;
use crate::config::ReaderOptionsError;
use crate::format::chunk::{ChecksumKind, ChunkError};
use std::io;

/// Result alias for commit log operations.
pub type Result<T> = std::result::Result<T, CommitLogError>;

/// Errors produced while reading a commit log.
///
/// `EndOfStream` is not a failure: it is how the reader reports that every
/// record has been delivered.
#[derive(Debug, thiserror::Error)]
pub enum CommitLogError {
    /// Every record has been read
    #[error("end of commit log stream")]
    EndOfStream,

    /// A chunk failed checksum validation
    #[error("commit log reader encountered chunk {0} checksum mismatch")]
    ChunkChecksumMismatch(ChecksumKind),

    /// The file ends in the middle of a chunk or record
    #[error("commit log is truncated")]
    Truncated,

    /// A record length prefix could not be decoded
    #[error("commit log record length prefix is malformed")]
    MalformedLength,

    /// A record length prefix exceeds the configured bound
    #[error("commit log record of {size} bytes exceeds limit of {max} bytes")]
    RecordTooLarge {
        /// Length read from the prefix
        size: u64,
        /// Configured upper bound
        max: usize,
    },

    /// A datapoint references a unique index whose metadata was never seen
    #[error("commit log reader encountered a datapoint without corresponding metadata (unique index {unique_index})")]
    MissingMetadata {
        /// Index of the unresolved series
        unique_index: u64,
    },

    /// `open` was called on a reader that has already been opened
    #[error("commit log reader is not reusable")]
    NotReusable,

    /// `read` was called before `open`
    #[error("commit log reader has not been opened")]
    NotOpened,

    /// `read` was called on a reader closed before it started reading
    #[error("commit log reader is closed")]
    Closed,

    /// The background pipeline was started twice
    #[error("commit log reader tried to start multiple read loops, do not call read() concurrently")]
    MultipleReadLoops,

    /// A background thread panicked
    #[error("commit log {0} thread panicked")]
    WorkerPanicked(String),

    /// Entry, metadata, or info decoding failed
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Invalid reader options
    #[error("invalid reader options: {0}")]
    Options(#[from] ReaderOptionsError),

    /// Unrecoverable I/O error
    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl CommitLogError {
    /// True for the normal end-of-stream signal.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, CommitLogError::EndOfStream)
    }

    /// True if the read loop can keep reading after this error.
    ///
    /// Framing and record-level damage is reported in-band and reading
    /// continues; anything the underlying file reports is terminal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CommitLogError::ChunkChecksumMismatch(_)
                | CommitLogError::Truncated
                | CommitLogError::MalformedLength
                | CommitLogError::RecordTooLarge { .. }
                | CommitLogError::Codec(_)
        )
    }
}

impl From<io::Error> for CommitLogError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return CommitLogError::Truncated;
        }
        if err.get_ref().map_or(false, |inner| inner.is::<ChunkError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(chunk_err) = inner.downcast::<ChunkError>() {
                    return CommitLogError::from(*chunk_err);
                }
            }
            return CommitLogError::Truncated;
        }
        CommitLogError::Io(err)
    }
}

impl From<ChunkError> for CommitLogError {
    fn from(err: ChunkError) -> Self {
        match err {
            ChunkError::ChecksumMismatch(kind) => CommitLogError::ChunkChecksumMismatch(kind),
            ChunkError::Truncated => CommitLogError::Truncated,
        }
    }
}
