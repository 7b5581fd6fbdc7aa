//! Commit log reader configuration.
//!
//! Options can be built in code or loaded from a TOML document:
//!
//! ```toml
//! read_concurrency = 4
//! flush_size = 65536
//! decode_queue_capacity = 1000
//! output_queue_capacity_per_worker = 1000
//! max_record_size = 67108864
//! codec = "msgpack"
//! ```
//!
//! Missing keys take their default values.

use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_read_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_flush_size() -> usize {
    64 * 1024
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_max_record_size() -> usize {
    64 * 1024 * 1024
}

fn default_codec() -> String {
    "msgpack".to_string()
}

/// Commit log reader configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Number of decode workers (default: available parallelism).
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,

    /// Initial capacity of pooled decode buffers in bytes (default: 64KB).
    ///
    /// Also the chunk size used when writing test files.
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,

    /// Capacity of each decode worker's input queue (default: 1000).
    ///
    /// Each worker's buffer pool holds one more buffer than this, which caps
    /// the bytes in flight per worker.
    #[serde(default = "default_queue_capacity")]
    pub decode_queue_capacity: usize,

    /// Output queue capacity contributed by each worker (default: 1000).
    #[serde(default = "default_queue_capacity")]
    pub output_queue_capacity_per_worker: usize,

    /// Largest record the reader accepts in bytes (default: 64MB).
    #[serde(default = "default_max_record_size")]
    pub max_record_size: usize,

    /// Entry codec identifier (default: "msgpack").
    #[serde(default = "default_codec")]
    pub codec: String,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            read_concurrency: default_read_concurrency(),
            flush_size: default_flush_size(),
            decode_queue_capacity: default_queue_capacity(),
            output_queue_capacity_per_worker: default_queue_capacity(),
            max_record_size: default_max_record_size(),
            codec: default_codec(),
        }
    }
}

impl ReaderOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set decode worker count (builder pattern).
    pub fn with_read_concurrency(mut self, workers: usize) -> Self {
        self.read_concurrency = workers;
        self
    }

    /// Set pooled buffer size (builder pattern).
    pub fn with_flush_size(mut self, bytes: usize) -> Self {
        self.flush_size = bytes;
        self
    }

    /// Set per-worker input queue capacity (builder pattern).
    pub fn with_decode_queue_capacity(mut self, capacity: usize) -> Self {
        self.decode_queue_capacity = capacity;
        self
    }

    /// Set per-worker output queue capacity (builder pattern).
    pub fn with_output_queue_capacity_per_worker(mut self, capacity: usize) -> Self {
        self.output_queue_capacity_per_worker = capacity;
        self
    }

    /// Set maximum record size (builder pattern).
    pub fn with_max_record_size(mut self, bytes: usize) -> Self {
        self.max_record_size = bytes;
        self
    }

    /// Set codec identifier (builder pattern).
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Total output queue capacity across all workers.
    pub fn output_queue_capacity(&self) -> usize {
        self.output_queue_capacity_per_worker
            .saturating_mul(self.read_concurrency)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ReaderOptionsError> {
        if self.read_concurrency == 0 {
            return Err(ReaderOptionsError::ZeroConcurrency);
        }
        if self.flush_size == 0 {
            return Err(ReaderOptionsError::ZeroFlushSize);
        }
        if self.decode_queue_capacity == 0 || self.output_queue_capacity_per_worker == 0 {
            return Err(ReaderOptionsError::ZeroQueueCapacity);
        }
        if self.flush_size > self.max_record_size {
            return Err(ReaderOptionsError::FlushSizeExceedsMaxRecord);
        }
        Ok(())
    }

    /// Parse and validate options from a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ReaderOptionsError> {
        let options: ReaderOptions =
            toml::from_str(content).map_err(|e| ReaderOptionsError::Parse(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load and validate options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ReaderOptionsError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReaderOptionsError::Io(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Options sized for tests: few workers, small queues and buffers.
    pub fn for_testing() -> Self {
        ReaderOptions {
            read_concurrency: 4,
            flush_size: 256,
            decode_queue_capacity: 8,
            output_queue_capacity_per_worker: 8,
            max_record_size: 1024 * 1024,
            codec: default_codec(),
        }
    }
}

/// Reader configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaderOptionsError {
    /// At least one decode worker is required.
    #[error("read concurrency must be at least 1")]
    ZeroConcurrency,

    /// Pooled buffers need a non-zero initial size.
    #[error("flush size must be non-zero")]
    ZeroFlushSize,

    /// Bounded queues need room for at least one item.
    #[error("queue capacities must be non-zero")]
    ZeroQueueCapacity,

    /// Buffers larger than any accepted record are never useful.
    #[error("flush size cannot exceed max record size")]
    FlushSizeExceedsMaxRecord,

    /// TOML could not be parsed.
    #[error("failed to parse reader options: {0}")]
    Parse(String),

    /// Options file could not be read.
    #[error("{0}")]
    Io(String),
}
