//! Physical chunk framing.
//!
//! A commit log file is a sequence of checksum-protected chunks. Each chunk
//! carries an arbitrary slice of the logical byte stream; records may span
//! chunk boundaries.
//!
//! # Chunk Layout
//!
//! ```text
//! ┌─────────────────┬──────────────────┬──────────────────┬───────────────────┐
//! │ Size (4, LE)    │ CRC32(size) (4)  │ CRC32(payload)(4)│ Payload (Size)    │
//! └─────────────────┴──────────────────┴──────────────────┴───────────────────┘
//! ```
//!
//! The size checksum lets the reader distinguish a corrupt length (nothing
//! after it can be trusted) from a corrupt payload (the chunk can be skipped).

use crc32fast::Hasher;
use std::fmt;
use std::io::{self, Read, Write};

/// Size of a chunk header in bytes
pub const CHUNK_HEADER_SIZE: usize = 12;

/// Which checksum in a chunk header failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// The size field does not match its checksum
    Size,
    /// The payload does not match its checksum
    Payload,
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumKind::Size => write!(f, "size"),
            ChecksumKind::Payload => write!(f, "payload"),
        }
    }
}

/// Framing-layer failure, carried inside `io::Error` by [`ChunkReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    /// Header or payload checksum did not validate
    #[error("chunk {0} checksum mismatch")]
    ChecksumMismatch(ChecksumKind),

    /// The source ended inside a chunk
    #[error("chunk truncated")]
    Truncated,
}

impl From<ChunkError> for io::Error {
    fn from(err: ChunkError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Reads the logical byte stream out of a sequence of chunks.
///
/// Implements `Read` over the concatenated payloads. Any checksum failure or
/// a truncated chunk is reported once and poisons the reader: every later
/// read returns `Ok(0)`. Records may straddle chunk boundaries, so nothing
/// after a damaged chunk can be trusted to start on a record.
pub struct ChunkReader<R> {
    source: Option<R>,
    payload: Vec<u8>,
    pos: usize,
    poisoned: bool,
    chunks_read: u64,
}

impl<R: Read> ChunkReader<R> {
    /// Create an unbound reader whose payload buffer starts at `capacity`.
    pub fn new(capacity: usize) -> Self {
        ChunkReader {
            source: None,
            payload: Vec::with_capacity(capacity),
            pos: 0,
            poisoned: false,
            chunks_read: 0,
        }
    }

    /// Rebind to a new source, discarding buffered state.
    ///
    /// Returns the previously bound source, if any.
    pub fn reset(&mut self, source: R) -> Option<R> {
        self.payload.clear();
        self.pos = 0;
        self.poisoned = false;
        self.chunks_read = 0;
        self.source.replace(source)
    }

    /// Unbind and return the current source.
    pub fn take_source(&mut self) -> Option<R> {
        self.payload.clear();
        self.pos = 0;
        self.source.take()
    }

    /// Whether a source is bound.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Number of chunks consumed since the last reset, damaged ones included.
    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    /// Load the next chunk's payload. Returns `false` at a clean end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        self.payload.clear();
        self.pos = 0;

        if self.poisoned {
            return Ok(false);
        }
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Ok(false),
        };

        let mut header = [0u8; CHUNK_HEADER_SIZE];
        let n = read_full(source, &mut header)?;
        if n == 0 {
            return Ok(false);
        }
        if n < CHUNK_HEADER_SIZE {
            self.poisoned = true;
            return Err(ChunkError::Truncated.into());
        }

        let size_bytes: [u8; 4] = [header[0], header[1], header[2], header[3]];
        let size_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let payload_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        self.chunks_read += 1;

        if checksum(&size_bytes) != size_crc {
            self.poisoned = true;
            return Err(ChunkError::ChecksumMismatch(ChecksumKind::Size).into());
        }

        let size = u32::from_le_bytes(size_bytes) as usize;
        self.payload.resize(size, 0);
        let n = read_full(source, &mut self.payload)?;
        if n < size {
            self.payload.clear();
            self.poisoned = true;
            return Err(ChunkError::Truncated.into());
        }

        if checksum(&self.payload) != payload_crc {
            self.payload.clear();
            self.poisoned = true;
            return Err(ChunkError::ChecksumMismatch(ChecksumKind::Payload).into());
        }

        Ok(true)
    }
}

impl<R: Read> Read for ChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // Zero-length chunks carry nothing; keep pulling until data or EOF.
        while self.pos == self.payload.len() {
            if !self.fill()? {
                return Ok(0);
            }
        }
        let available = &self.payload[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read until `buf` is full or the source is exhausted; returns bytes read.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Location of one written chunk within the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Byte offset of the chunk header
    pub offset: u64,
    /// Payload length
    pub len: usize,
}

impl ChunkSpan {
    /// Byte offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + CHUNK_HEADER_SIZE as u64
    }
}

/// Buffers the logical byte stream and emits it as chunks.
///
/// A chunk is written whenever `chunk_size` bytes are buffered and on every
/// `flush`.
pub struct ChunkWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    chunk_size: usize,
    written: u64,
    spans: Vec<ChunkSpan>,
}

impl<W: Write> ChunkWriter<W> {
    /// Create a writer emitting chunks of at most `chunk_size` bytes.
    pub fn new(inner: W, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        ChunkWriter {
            inner,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            written: 0,
            spans: Vec::new(),
        }
    }

    /// Chunks written so far.
    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }

    /// Flush and return the inner writer.
    pub fn into_inner(mut self) -> io::Result<(W, Vec<ChunkSpan>)> {
        self.flush()?;
        let spans = std::mem::take(&mut self.spans);
        Ok((self.inner, spans))
    }

    fn emit_chunk(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let size = u32::try_from(self.buffer.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk exceeds u32::MAX"))?;
        let size_bytes = size.to_le_bytes();

        let mut header = [0u8; CHUNK_HEADER_SIZE];
        header[0..4].copy_from_slice(&size_bytes);
        header[4..8].copy_from_slice(&checksum(&size_bytes).to_le_bytes());
        header[8..12].copy_from_slice(&checksum(&self.buffer).to_le_bytes());

        self.inner.write_all(&header)?;
        self.inner.write_all(&self.buffer)?;

        self.spans.push(ChunkSpan {
            offset: self.written,
            len: self.buffer.len(),
        });
        self.written += (CHUNK_HEADER_SIZE + self.buffer.len()) as u64;
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for ChunkWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.buffer.len();
        let n = room.min(buf.len());
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == self.chunk_size {
            self.emit_chunk()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_chunk()?;
        self.inner.flush()
    }
}
