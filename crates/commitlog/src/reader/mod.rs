//! Commit log reader.
//!
//! A concurrent, single-pass reader over one commit log file:
//!
//! ```text
//! file ─► read loop ─┬─► decode worker 0 ─┐
//!                    ├─► decode worker 1 ─┼─► output queue ─► read()
//!                    └─► decode worker N ─┘
//! ```
//!
//! - `read_loop`: the sequential producer, routing by `unique_index % N`
//! - `decoder`: decode workers and their metadata caches
//!
//! # Ordering
//!
//! Datapoints of one series are returned in file order. Nothing is
//! guaranteed across series: given a file holding
//! `A1, B1, B2, A2, C1, D1, D2, A3, B3` the caller sees `A1` before `A2`
//! before `A3` and `B1` before `B2` before `B3`, but may see `B1` before
//! `A1` or `D2` before `B3`.
//!
//! # Lifecycle
//!
//! A reader is single-use: `open` once, `read` until `EndOfStream`, `close`.
//! The pipeline starts on the first `read`. `close` cancels the read loop and
//! drains the output queue so no worker stays blocked, then releases the
//! file.

pub mod decoder;
mod read_loop;

pub use decoder::{LogRecord, MetadataCache, ReadResponse, SeriesMetadata};

use crate::codec::{get_codec, EntryCodec, LogInfo};
use crate::config::ReaderOptions;
use crate::error::{CommitLogError, Result};
use crate::format::RecordReader;
use crate::pool::BufferPool;
use crate::predicate::SeriesPredicate;
use crossbeam_channel::{bounded, Receiver};
use decoder::{DecodeWorker, WorkerGroup};
use parking_lot::Mutex;
use read_loop::ReadLoop;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type FileSource = BufReader<File>;

struct Pipeline {
    output: Receiver<ReadResponse>,
    read_loop: Option<JoinHandle<RecordReader<FileSource>>>,
    workers: Vec<JoinHandle<()>>,
    group: Arc<WorkerGroup>,
}

/// Single-use concurrent commit log reader.
///
/// `read` must not be called concurrently from several threads; doing so on
/// the first call is detected and reported as `MultipleReadLoops`.
pub struct CommitLogReader {
    options: ReaderOptions,
    codec: Arc<dyn EntryCodec>,
    predicate: SeriesPredicate,
    opened: AtomicBool,
    started: AtomicBool,
    closed: AtomicBool,
    cancel: Arc<AtomicBool>,
    source: Mutex<RecordReader<FileSource>>,
    pipeline: OnceLock<Mutex<Pipeline>>,
    records_read: AtomicU64,
}

impl CommitLogReader {
    /// Create a reader using the codec named in `options`.
    pub fn new(options: ReaderOptions, predicate: SeriesPredicate) -> Result<Self> {
        let codec = get_codec(&options.codec)?;
        Self::with_codec(options, predicate, codec)
    }

    /// Create a reader with an explicit codec.
    pub fn with_codec(
        options: ReaderOptions,
        predicate: SeriesPredicate,
        codec: Arc<dyn EntryCodec>,
    ) -> Result<Self> {
        options.validate()?;
        let source = RecordReader::new(options.flush_size, options.max_record_size);
        Ok(CommitLogReader {
            options,
            codec,
            predicate,
            opened: AtomicBool::new(false),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            source: Mutex::new(source),
            pipeline: OnceLock::new(),
            records_read: AtomicU64::new(0),
        })
    }

    /// Open a commit log file and read its info header.
    ///
    /// Fails with `NotReusable` if this reader was opened before, whether or
    /// not that attempt succeeded. On any other failure the file is closed
    /// before returning.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<LogInfo> {
        if self.opened.swap(true, Ordering::AcqRel) {
            return Err(CommitLogError::NotReusable);
        }
        let path = path.as_ref();

        let file = File::open(path)?;
        let mut source = self.source.lock();
        source.reset(BufReader::with_capacity(self.options.flush_size, file));

        match self.read_info(&mut source) {
            Ok(info) => {
                debug!(
                    path = %path.display(),
                    start = %info.start,
                    duration = ?info.duration,
                    index = info.index,
                    "opened commit log"
                );
                Ok(info)
            }
            Err(err) => {
                drop(source.take_source());
                Err(err)
            }
        }
    }

    fn read_info(&self, source: &mut RecordReader<FileSource>) -> Result<LogInfo> {
        let mut buf = Vec::new();
        let data = match source.read_chunk(&mut buf) {
            Err(CommitLogError::EndOfStream) => return Err(CommitLogError::Truncated),
            other => other?,
        };
        Ok(self.codec.decode_info(data)?)
    }

    /// Return the next datapoint.
    ///
    /// Starts the background pipeline on the first call. Returns
    /// `EndOfStream` once every record has been delivered. Per-record
    /// failures (corruption, missing metadata, decode errors) are returned as
    /// errors in stream position; reading can continue past them.
    pub fn read(&self) -> Result<LogRecord> {
        if !self.opened.load(Ordering::Acquire) {
            return Err(CommitLogError::NotOpened);
        }
        if !self.started.load(Ordering::Acquire) {
            self.start_background_workers()?;
        }

        let pipeline = match self.pipeline.get() {
            Some(pipeline) => pipeline,
            None if self.closed.load(Ordering::Acquire) => return Err(CommitLogError::Closed),
            None => return Err(CommitLogError::MultipleReadLoops),
        };
        let output = pipeline.lock().output.clone();
        match output.recv() {
            Ok(response) => {
                self.records_read.fetch_add(1, Ordering::Relaxed);
                response
            }
            Err(_) => Err(CommitLogError::EndOfStream),
        }
    }

    /// Number of responses handed to the caller so far.
    pub fn records_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    fn start_background_workers(&self) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CommitLogError::MultipleReadLoops);
        }

        // A failed start leaves nothing to read; later calls report `Closed`.
        let source = {
            let mut source = self.source.lock();
            if !source.has_source() {
                self.closed.store(true, Ordering::Release);
                return Err(CommitLogError::Closed);
            }
            std::mem::replace(&mut *source, RecordReader::new(0, self.options.max_record_size))
        };

        match self.spawn_pipeline(source) {
            Ok(pipeline) => {
                self.pipeline.get_or_init(move || Mutex::new(pipeline));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to start commit log read pipeline");
                self.closed.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    fn spawn_pipeline(&self, source: RecordReader<FileSource>) -> Result<Pipeline> {
        let n = self.options.read_concurrency;
        let (out_tx, out_rx) = bounded(self.options.output_queue_capacity());
        let group = WorkerGroup::new(n);

        let mut queues = Vec::with_capacity(n);
        let mut pools = Vec::with_capacity(n);
        let mut workers = Vec::with_capacity(n);
        for i in 0..n {
            let (in_tx, in_rx) = bounded(self.options.decode_queue_capacity);
            queues.push(in_tx);
            pools.push(BufferPool::new(
                self.options.decode_queue_capacity + 1,
                self.options.flush_size,
            ));

            let worker = DecodeWorker::new(
                i,
                Arc::clone(&self.codec),
                Arc::clone(&self.predicate),
                in_rx,
                out_tx.clone(),
                Arc::clone(&group),
            );
            let spawned = thread::Builder::new()
                .name(format!("commitlog-decode-{}", i))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Closing the input queues stops the workers already running.
                    drop(queues);
                    join_quietly(workers);
                    return Err(e.into());
                }
            }
        }
        // Only the workers may hold output senders, or the queue never closes.
        drop(out_tx);

        let read_loop = ReadLoop::new(
            source,
            Arc::clone(&self.codec),
            queues,
            pools,
            Arc::clone(&self.cancel),
            self.options.flush_size,
        );
        let read_loop = match thread::Builder::new()
            .name("commitlog-read".to_string())
            .spawn(move || read_loop.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // The unspawned read loop, and with it every input queue, is
                // already dropped.
                join_quietly(workers);
                return Err(e.into());
            }
        };

        debug!(workers = n, "started commit log read pipeline");
        Ok(Pipeline {
            output: out_rx,
            read_loop: Some(read_loop),
            workers,
            group,
        })
    }

    /// Stop reading and release the file.
    ///
    /// If the pipeline never started the file is simply closed. Otherwise
    /// the read loop is cancelled and the output queue drained until the
    /// last decode worker closes it; only then is the file released.
    /// Calling `close` again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let pipeline = match self.pipeline.get() {
            Some(pipeline) => pipeline,
            None => {
                drop(self.source.lock().take_source());
                return Ok(());
            }
        };

        self.cancel.store(true, Ordering::Release);
        let mut pipeline = pipeline.lock();

        let mut drained: u64 = 0;
        while pipeline.output.recv().is_ok() {
            drained += 1;
        }

        let mut result = Ok(());
        for handle in pipeline.workers.drain(..) {
            if handle.join().is_err() {
                error!("commit log decode worker panicked");
                result = Err(CommitLogError::WorkerPanicked("decode".to_string()));
            }
        }
        if let Some(handle) = pipeline.read_loop.take() {
            match handle.join() {
                Ok(mut source) => drop(source.take_source()),
                Err(_) => {
                    error!("commit log read loop panicked");
                    result = Err(CommitLogError::WorkerPanicked("read".to_string()));
                }
            }
        }
        debug!(
            drained,
            finished_workers = pipeline.group.finished(),
            "closed commit log reader"
        );
        result
    }
}

impl Drop for CommitLogReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "failed to close commit log reader");
        }
    }
}

fn join_quietly(workers: Vec<JoinHandle<()>>) {
    for handle in workers {
        if handle.join().is_err() {
            error!("commit log decode worker panicked");
        }
    }
}

/// Yields the remaining records; `EndOfStream` ends the iteration.
impl Iterator for CommitLogReader {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read() {
            Err(CommitLogError::EndOfStream) => None,
            other => Some(other),
        }
    }
}

impl std::fmt::Debug for CommitLogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLogReader")
            .field("options", &self.options)
            .field("codec", &self.codec.codec_id())
            .field("opened", &self.opened.load(Ordering::Relaxed))
            .field("started", &self.started.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("records_read", &self.records_read())
            .finish()
    }
}
