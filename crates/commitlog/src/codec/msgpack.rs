//! MessagePack entry codec.
//!
//! # Entry Record Layout
//!
//! ```text
//! ┌──────────────┬────────────────────┬───────────────────────────────────────────────┐
//! │ version (u8) │ unique_index (u64) │ [timestamp, value, unit, annotation, metadata]│
//! └──────────────┴────────────────────┴───────────────────────────────────────────────┘
//! ```
//!
//! Each segment is an independent MessagePack value, so the head can be read
//! without touching the tail.

use super::traits::{
    CodecError, DecodeRemainingToken, EntryCodec, EntryHead, LogEntry, LogInfo, LogMetadata,
};
use quill_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;

/// Current log info format version
pub const LOG_INFO_FORMAT_VERSION: u8 = 1;

/// Current log entry format version
pub const LOG_ENTRY_FORMAT_VERSION: u8 = 1;

/// Current metadata format version
pub const LOG_METADATA_FORMAT_VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct InfoWire {
    version: u8,
    start: i64,
    duration: i64,
    index: i64,
}

#[derive(Serialize, Deserialize)]
struct EntryTailWire {
    timestamp: i64,
    value: f64,
    unit: u8,
    #[serde(with = "serde_bytes")]
    annotation: Vec<u8>,
    #[serde(with = "serde_bytes")]
    metadata: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct MetadataWire {
    version: u8,
    #[serde(with = "serde_bytes")]
    id: Vec<u8>,
    #[serde(with = "serde_bytes")]
    namespace: Vec<u8>,
    shard: u32,
}

/// MessagePack codec backed by rmp-serde.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgpackCodec;

impl MsgpackCodec {
    /// Create the codec.
    pub fn new() -> Self {
        MsgpackCodec
    }
}

fn check_version(what: &'static str, found: u8, expected: u8) -> Result<(), CodecError> {
    if found != expected {
        return Err(CodecError::UnsupportedVersion {
            what,
            found,
            expected,
        });
    }
    Ok(())
}

impl EntryCodec for MsgpackCodec {
    fn decode_info(&self, data: &[u8]) -> Result<LogInfo, CodecError> {
        let wire: InfoWire =
            rmp_serde::from_slice(data).map_err(|e| CodecError::decode("log info", e))?;
        check_version("log info", wire.version, LOG_INFO_FORMAT_VERSION)?;
        let duration = u64::try_from(wire.duration)
            .map_err(|_| CodecError::decode("log info", "negative duration"))?;
        Ok(LogInfo {
            start: Timestamp::from_nanos(wire.start),
            duration: Duration::from_nanos(duration),
            index: wire.index,
        })
    }

    fn decode_unique_index(&self, data: &[u8]) -> Result<EntryHead, CodecError> {
        let mut cursor = Cursor::new(data);
        let version: u8 = rmp_serde::from_read(&mut cursor)
            .map_err(|e| CodecError::decode("log entry version", e))?;
        check_version("log entry", version, LOG_ENTRY_FORMAT_VERSION)?;
        let unique_index: u64 = rmp_serde::from_read(&mut cursor)
            .map_err(|e| CodecError::decode("log entry unique index", e))?;
        Ok(EntryHead {
            token: DecodeRemainingToken { version },
            unique_index,
            offset: cursor.position() as usize,
        })
    }

    fn decode_remaining(
        &self,
        data: &[u8],
        token: DecodeRemainingToken,
        unique_index: u64,
    ) -> Result<LogEntry, CodecError> {
        check_version("log entry", token.version, LOG_ENTRY_FORMAT_VERSION)?;
        let tail: EntryTailWire =
            rmp_serde::from_slice(data).map_err(|e| CodecError::decode("log entry", e))?;
        Ok(LogEntry {
            unique_index,
            timestamp: tail.timestamp,
            value: tail.value,
            unit: tail.unit,
            annotation: tail.annotation,
            metadata: tail.metadata,
        })
    }

    fn decode_metadata(&self, data: &[u8]) -> Result<LogMetadata, CodecError> {
        let wire: MetadataWire =
            rmp_serde::from_slice(data).map_err(|e| CodecError::decode("log metadata", e))?;
        check_version("log metadata", wire.version, LOG_METADATA_FORMAT_VERSION)?;
        Ok(LogMetadata {
            id: wire.id,
            namespace: wire.namespace,
            shard: wire.shard,
        })
    }

    fn encode_info(&self, info: &LogInfo) -> Result<Vec<u8>, CodecError> {
        let duration = i64::try_from(info.duration.as_nanos())
            .map_err(|_| CodecError::encode("log info", "duration overflows i64 nanoseconds"))?;
        let wire = InfoWire {
            version: LOG_INFO_FORMAT_VERSION,
            start: info.start.as_nanos(),
            duration,
            index: info.index,
        };
        rmp_serde::to_vec(&wire).map_err(|e| CodecError::encode("log info", e))
    }

    fn encode_entry(&self, entry: &LogEntry) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(32 + entry.annotation.len() + entry.metadata.len());
        let tail = EntryTailWire {
            timestamp: entry.timestamp,
            value: entry.value,
            unit: entry.unit,
            annotation: entry.annotation.clone(),
            metadata: entry.metadata.clone(),
        };
        rmp_serde::encode::write(&mut buf, &LOG_ENTRY_FORMAT_VERSION)
            .and_then(|_| rmp_serde::encode::write(&mut buf, &entry.unique_index))
            .and_then(|_| rmp_serde::encode::write(&mut buf, &tail))
            .map_err(|e| CodecError::encode("log entry", e))?;
        Ok(buf)
    }

    fn encode_metadata(&self, metadata: &LogMetadata) -> Result<Vec<u8>, CodecError> {
        let wire = MetadataWire {
            version: LOG_METADATA_FORMAT_VERSION,
            id: metadata.id.clone(),
            namespace: metadata.namespace.clone(),
            shard: metadata.shard,
        };
        rmp_serde::to_vec(&wire).map_err(|e| CodecError::encode("log metadata", e))
    }

    fn codec_id(&self) -> &str {
        "msgpack"
    }
}
