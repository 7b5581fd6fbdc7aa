//! Decode workers and their metadata caches.
//!
//! Every entry for a given unique index is routed to the same worker, so a
//! worker's cache sees a series' metadata before (or alongside) all of its
//! datapoints, and in file order.

use crate::codec::{CodecError, DecodeRemainingToken, EntryCodec, LogMetadata};
use crate::error::CommitLogError;
use crate::pool::PooledBuffer;
use crate::predicate::SeriesPredicate;
use crossbeam_channel::{Receiver, Sender};
use quill_core::{Annotation, Datapoint, Ident, Series, TimeUnit, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// One datapoint read from a commit log, with its resolved series.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Series the datapoint belongs to
    pub series: Series,
    /// Timestamp and value
    pub datapoint: Datapoint,
    /// Unit the datapoint was written in
    pub unit: TimeUnit,
    /// Annotation bytes, empty when none were written
    pub annotation: Annotation,
    /// Series index within the file
    pub unique_index: u64,
}

/// Pipeline output message.
pub type ReadResponse = Result<LogRecord, CommitLogError>;

/// Work item handed from the read loop to a decode worker.
pub(crate) enum DecodeTask {
    /// A record whose head has already been decoded
    Entry {
        buffer: PooledBuffer,
        token: DecodeRemainingToken,
        unique_index: u64,
        offset: usize,
    },
    /// An error to pass through to the caller
    Failed(CommitLogError),
}

/// Cached series identity plus the predicate verdict for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMetadata {
    /// Resolved identity
    pub series: Series,
    /// Whether the series passed the reader's predicate
    pub passed_predicate: bool,
}

/// Per-worker map from unique index to resolved series.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: HashMap<u64, SeriesMetadata>,
}

impl MetadataCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a resolved series.
    pub fn get(&self, unique_index: u64) -> Option<&SeriesMetadata> {
        self.entries.get(&unique_index)
    }

    /// Resolve `unique_index` to the identity in `metadata`.
    ///
    /// First writer wins: if the index is already resolved the new identity
    /// is discarded and `false` is returned. The predicate runs only when a
    /// new identity is inserted.
    pub fn resolve(
        &mut self,
        unique_index: u64,
        metadata: LogMetadata,
        predicate: &SeriesPredicate,
    ) -> bool {
        if self.entries.contains_key(&unique_index) {
            return false;
        }
        let series = Series {
            unique_index,
            id: Ident::from(metadata.id),
            namespace: Ident::from(metadata.namespace),
            shard: metadata.shard,
        };
        let passed_predicate = predicate(&series.id, &series.namespace);
        self.entries.insert(
            unique_index,
            SeriesMetadata {
                series,
                passed_predicate,
            },
        );
        true
    }

    /// Number of resolved series.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing has been resolved.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracks how many decode workers have stopped producing.
pub(crate) struct WorkerGroup {
    total: usize,
    finished: AtomicUsize,
}

impl WorkerGroup {
    pub(crate) fn new(total: usize) -> Arc<Self> {
        Arc::new(WorkerGroup {
            total,
            finished: AtomicUsize::new(0),
        })
    }

    /// Record one finished worker. Returns true for the last one.
    fn finish(&self) -> bool {
        self.finished.fetch_add(1, Ordering::AcqRel) + 1 == self.total
    }

    pub(crate) fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }
}

/// One decode worker: owns an input queue and a metadata cache.
pub(crate) struct DecodeWorker {
    id: usize,
    codec: Arc<dyn EntryCodec>,
    predicate: SeriesPredicate,
    cache: MetadataCache,
    input: Receiver<DecodeTask>,
    output: Sender<ReadResponse>,
    group: Arc<WorkerGroup>,
}

impl DecodeWorker {
    pub(crate) fn new(
        id: usize,
        codec: Arc<dyn EntryCodec>,
        predicate: SeriesPredicate,
        input: Receiver<DecodeTask>,
        output: Sender<ReadResponse>,
        group: Arc<WorkerGroup>,
    ) -> Self {
        DecodeWorker {
            id,
            codec,
            predicate,
            cache: MetadataCache::new(),
            input,
            output,
            group,
        }
    }

    /// Consume the input queue until it closes.
    ///
    /// The output sender is dropped before the worker counts itself
    /// finished, so the worker that brings the count to the total knows the
    /// output queue is closed.
    pub(crate) fn run(mut self) {
        while let Ok(task) = self.input.recv() {
            let response = match task {
                DecodeTask::Failed(err) => Some(Err(err)),
                DecodeTask::Entry {
                    buffer,
                    token,
                    unique_index,
                    offset,
                } => self.decode(buffer, token, unique_index, offset),
            };

            if let Some(response) = response {
                if self.output.send(response).is_err() {
                    debug!(worker = self.id, "output queue disconnected, stopping decode worker");
                    break;
                }
            }
        }

        let DecodeWorker {
            id,
            output,
            group,
            cache,
            ..
        } = self;
        drop(output);
        if group.finish() {
            debug!(worker = id, series = cache.len(), "all decode workers finished, output queue closed");
        }
    }

    /// Decode one record. `None` means the series was filtered out.
    ///
    /// `buffer` goes back to its pool when this returns; everything in the
    /// response is owned, including the annotation.
    fn decode(
        &mut self,
        buffer: PooledBuffer,
        token: DecodeRemainingToken,
        unique_index: u64,
        offset: usize,
    ) -> Option<ReadResponse> {
        let tail = match buffer.get(offset..) {
            Some(tail) => tail,
            None => {
                return Some(Err(
                    CodecError::decode("log entry", "tail offset beyond record").into()
                ))
            }
        };
        let entry = match self.codec.decode_remaining(tail, token, unique_index) {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };
        drop(buffer);

        if entry.has_metadata() {
            match self.codec.decode_metadata(&entry.metadata) {
                Ok(metadata) => {
                    self.cache.resolve(entry.unique_index, metadata, &self.predicate);
                }
                Err(e) => return Some(Err(e.into())),
            }
        }

        let metadata = match self.cache.get(entry.unique_index) {
            Some(metadata) => metadata,
            None => {
                warn!(
                    worker = self.id,
                    unique_index = entry.unique_index,
                    "datapoint without corresponding metadata"
                );
                return Some(Err(CommitLogError::MissingMetadata {
                    unique_index: entry.unique_index,
                }));
            }
        };

        if !metadata.passed_predicate {
            return None;
        }

        let unit = match TimeUnit::try_from(entry.unit) {
            Ok(unit) => unit,
            Err(e) => return Some(Err(CodecError::InvalidUnit(e.0).into())),
        };

        Some(Ok(LogRecord {
            series: metadata.series.clone(),
            datapoint: Datapoint {
                timestamp: Timestamp::from_nanos(entry.timestamp),
                value: entry.value,
            },
            unit,
            annotation: entry.annotation,
            unique_index: entry.unique_index,
        }))
    }
}
