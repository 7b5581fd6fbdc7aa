//! Length-prefixed records carried inside the chunk stream.
//!
//! # Record Layout
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────┐
//! │ Length (LEB128 u64)  │ Payload (Length bytes)      │
//! └──────────────────────┴─────────────────────────────┘
//! ```
//!
//! The first record of a file is the log info header; every following record
//! is one log entry.

use crate::error::{CommitLogError, Result};
use crate::format::chunk::ChunkReader;
use std::io::{self, Read, Write};

/// Longest LEB128 encoding of a u64
const MAX_VARINT_LEN: usize = 10;

/// Sequential record reader over a chunked source.
pub struct RecordReader<R> {
    chunks: ChunkReader<R>,
    max_record_size: usize,
}

impl<R: Read> RecordReader<R> {
    /// Create an unbound reader.
    pub fn new(initial_capacity: usize, max_record_size: usize) -> Self {
        RecordReader {
            chunks: ChunkReader::new(initial_capacity),
            max_record_size,
        }
    }

    /// Rebind to a new source and reset internal buffering.
    pub fn reset(&mut self, source: R) -> Option<R> {
        self.chunks.reset(source)
    }

    /// Unbind and return the current source.
    pub fn take_source(&mut self) -> Option<R> {
        self.chunks.take_source()
    }

    /// Whether a source is bound.
    pub fn has_source(&self) -> bool {
        self.chunks.has_source()
    }

    /// Read the next record into `buf`, reusing its allocation.
    ///
    /// Returns `EndOfStream` when the stream is exhausted before the first
    /// byte of a length prefix.
    pub fn read_chunk<'b>(&mut self, buf: &'b mut Vec<u8>) -> Result<&'b [u8]> {
        let size = self.read_length()?;
        if size > self.max_record_size as u64 {
            return Err(CommitLogError::RecordTooLarge {
                size,
                max: self.max_record_size,
            });
        }

        buf.clear();
        buf.resize(size as usize, 0);
        self.chunks.read_exact(buf)?;
        Ok(buf.as_slice())
    }

    fn read_length(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut byte = [0u8; 1];
        for i in 0..MAX_VARINT_LEN {
            if self.chunks.read(&mut byte)? == 0 {
                return Err(if i == 0 {
                    CommitLogError::EndOfStream
                } else {
                    CommitLogError::Truncated
                });
            }
            let b = byte[0];
            if i == MAX_VARINT_LEN - 1 && b > 1 {
                return Err(CommitLogError::MalformedLength);
            }
            value |= u64::from(b & 0x7F) << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CommitLogError::MalformedLength)
    }
}

/// Append one length-prefixed record to `writer`.
pub fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let mut prefix = [0u8; MAX_VARINT_LEN];
    let mut value = payload.len() as u64;
    let mut n = 0;
    loop {
        let b = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            prefix[n] = b;
            n += 1;
            break;
        }
        prefix[n] = b | 0x80;
        n += 1;
    }
    writer.write_all(&prefix[..n])?;
    writer.write_all(payload)
}
