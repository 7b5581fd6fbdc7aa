//! Entry codec trait definitions.

use quill_core::Timestamp;
use std::time::Duration;

/// Volume header, the first record of every commit log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogInfo {
    /// Start of the time window the file covers
    pub start: Timestamp,
    /// Length of the time window
    pub duration: Duration,
    /// Volume index of the file
    pub index: i64,
}

/// One decoded log entry.
///
/// A non-empty `metadata` blob makes this a metadata-bearing entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Series index within the file
    pub unique_index: u64,
    /// Nanoseconds since Unix epoch
    pub timestamp: i64,
    /// Datapoint value
    pub value: f64,
    /// Raw time unit byte
    pub unit: u8,
    /// Opaque annotation bytes
    pub annotation: Vec<u8>,
    /// Encoded [`LogMetadata`], empty when absent
    pub metadata: Vec<u8>,
}

impl LogEntry {
    /// Whether this entry carries series metadata.
    #[inline]
    pub fn has_metadata(&self) -> bool {
        !self.metadata.is_empty()
    }
}

/// Series identity carried by metadata-bearing entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMetadata {
    /// Series ID
    pub id: Vec<u8>,
    /// Namespace ID
    pub namespace: Vec<u8>,
    /// Owning shard
    pub shard: u32,
}

/// State carried from a head decode to the matching tail decode.
///
/// Produced by [`EntryCodec::decode_unique_index`]; the tail of the same
/// record must be decoded with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeRemainingToken {
    pub(crate) version: u8,
}

/// Result of decoding only the head of an entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHead {
    /// Token for [`EntryCodec::decode_remaining`]
    pub token: DecodeRemainingToken,
    /// Series index of the entry
    pub unique_index: u64,
    /// Offset of the entry tail within the record
    pub offset: usize,
}

/// Entry codec trait.
///
/// Decoding is split so the routing index can be extracted cheaply on the
/// read loop, with the rest of the work deferred to a decode worker.
///
/// # Thread Safety
///
/// Codecs are stateless per call and shared by every pipeline thread, so
/// they must be `Send + Sync`.
pub trait EntryCodec: Send + Sync {
    /// Decode a log info record.
    fn decode_info(&self, data: &[u8]) -> Result<LogInfo, CodecError>;

    /// Decode only the unique index from the head of an entry record.
    fn decode_unique_index(&self, data: &[u8]) -> Result<EntryHead, CodecError>;

    /// Decode the tail of an entry record, starting at `EntryHead::offset`.
    fn decode_remaining(
        &self,
        data: &[u8],
        token: DecodeRemainingToken,
        unique_index: u64,
    ) -> Result<LogEntry, CodecError>;

    /// Decode a metadata blob.
    fn decode_metadata(&self, data: &[u8]) -> Result<LogMetadata, CodecError>;

    /// Encode a log info record.
    fn encode_info(&self, info: &LogInfo) -> Result<Vec<u8>, CodecError>;

    /// Encode an entry record.
    fn encode_entry(&self, entry: &LogEntry) -> Result<Vec<u8>, CodecError>;

    /// Encode a metadata blob.
    fn encode_metadata(&self, metadata: &LogMetadata) -> Result<Vec<u8>, CodecError>;

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Bytes could not be decoded
    #[error("failed to decode {what}: {detail}")]
    Decode {
        /// What was being decoded
        what: &'static str,
        /// Human-readable error description
        detail: String,
    },

    /// Value could not be encoded
    #[error("failed to encode {what}: {detail}")]
    Encode {
        /// What was being encoded
        what: &'static str,
        /// Human-readable error description
        detail: String,
    },

    /// Record written with a format version this codec does not read
    #[error("unsupported {what} version {found}, expected {expected}")]
    UnsupportedVersion {
        /// What was being decoded
        what: &'static str,
        /// Version found in the record
        found: u8,
        /// Version this codec reads
        expected: u8,
    },

    /// Entry carries an unknown time unit byte
    #[error("invalid time unit byte {0}")]
    InvalidUnit(u8),
}

impl CodecError {
    /// Create a decode error.
    pub fn decode(what: &'static str, detail: impl ToString) -> Self {
        CodecError::Decode {
            what,
            detail: detail.to_string(),
        }
    }

    /// Create an encode error.
    pub fn encode(what: &'static str, detail: impl ToString) -> Self {
        CodecError::Encode {
            what,
            detail: detail.to_string(),
        }
    }
}
