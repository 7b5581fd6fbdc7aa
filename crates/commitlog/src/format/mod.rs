//! On-disk commit log framing.
//!
//! - `chunk`: checksum-protected physical chunks
//! - `record`: length-prefixed records carried in the chunk stream

pub mod chunk;
pub mod record;

pub use chunk::{ChecksumKind, ChunkError, ChunkReader, ChunkSpan, ChunkWriter, CHUNK_HEADER_SIZE};
pub use record::{write_record, RecordReader};
