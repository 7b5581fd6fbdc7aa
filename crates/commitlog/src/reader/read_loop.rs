//! The read loop: the only thread that touches the file.
//!
//! Reads records in file order, extracts each entry's unique index, and
//! routes the bytes to decode worker `unique_index % N`. Routing by index is
//! what keeps a series' metadata and datapoints on one worker, in order.

use crate::codec::EntryCodec;
use crate::error::CommitLogError;
use crate::format::RecordReader;
use crate::pool::BufferPool;
use crate::reader::decoder::DecodeTask;
use crossbeam_channel::Sender;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

enum Step {
    Routed,
    Forwarded,
    Done(&'static str),
}

pub(crate) struct ReadLoop<R> {
    source: RecordReader<R>,
    codec: Arc<dyn EntryCodec>,
    queues: Vec<Sender<DecodeTask>>,
    pools: Vec<Arc<BufferPool>>,
    cancel: Arc<AtomicBool>,
    scratch: Vec<u8>,
}

impl<R: Read> ReadLoop<R> {
    pub(crate) fn new(
        source: RecordReader<R>,
        codec: Arc<dyn EntryCodec>,
        queues: Vec<Sender<DecodeTask>>,
        pools: Vec<Arc<BufferPool>>,
        cancel: Arc<AtomicBool>,
        scratch_capacity: usize,
    ) -> Self {
        debug_assert_eq!(queues.len(), pools.len());
        ReadLoop {
            source,
            codec,
            queues,
            pools,
            cancel,
            scratch: Vec::with_capacity(scratch_capacity),
        }
    }

    /// Run until end of stream, cancellation, or a terminal error.
    ///
    /// Every worker queue is closed on return, which is what lets the
    /// decode workers, and through them the output queue, shut down. The
    /// record source is handed back so the caller decides when the file is
    /// closed.
    pub(crate) fn run(mut self) -> RecordReader<R> {
        let mut routed: u64 = 0;
        let mut forwarded: u64 = 0;
        let reason = loop {
            if self.cancel.load(Ordering::Acquire) {
                break "cancelled";
            }
            match self.step() {
                Step::Routed => routed += 1,
                Step::Forwarded => forwarded += 1,
                Step::Done(reason) => break reason,
            }
        };
        debug!(reason, routed, forwarded, "commit log read loop finished");

        self.queues.clear();
        self.source
    }

    fn step(&mut self) -> Step {
        let data = match self.source.read_chunk(&mut self.scratch) {
            Ok(data) => data,
            Err(CommitLogError::EndOfStream) => return Step::Done("end of stream"),
            Err(err) => {
                let recoverable = err.is_recoverable();
                warn!(error = %err, recoverable, "forwarding commit log read error");
                // Errors carry no index to route by; worker 0 reports them.
                if !self.send(0, DecodeTask::Failed(err)) {
                    return Step::Done("decode workers disconnected");
                }
                return if recoverable {
                    Step::Forwarded
                } else {
                    Step::Done("unrecoverable read error")
                };
            }
        };

        let head = match self.codec.decode_unique_index(data) {
            Ok(head) => head,
            Err(err) => {
                warn!(error = %err, "forwarding undecodable entry head");
                if !self.send(0, DecodeTask::Failed(err.into())) {
                    return Step::Done("decode workers disconnected");
                }
                return Step::Forwarded;
            }
        };

        let worker = (head.unique_index % self.queues.len() as u64) as usize;
        let mut buffer = self.pools[worker].acquire();
        buffer.fill_from(data);

        let task = DecodeTask::Entry {
            buffer,
            token: head.token,
            unique_index: head.unique_index,
            offset: head.offset,
        };
        if !self.send(worker, task) {
            return Step::Done("decode workers disconnected");
        }
        Step::Routed
    }

    fn send(&self, worker: usize, task: DecodeTask) -> bool {
        self.queues[worker].send(task).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LogEntry, MsgpackCodec};
    use crate::format::{write_record, ChunkWriter};
    use crossbeam_channel::{bounded, Receiver};
    use std::io::Cursor;
    use std::io::Write;

    fn encode_stream(indices: &[u64]) -> Vec<u8> {
        let codec = MsgpackCodec::new();
        let mut writer = ChunkWriter::new(Vec::new(), 128);
        for (i, index) in indices.iter().enumerate() {
            let entry = LogEntry {
                unique_index: *index,
                timestamp: i as i64,
                value: 0.0,
                unit: 0,
                annotation: Vec::new(),
                metadata: Vec::new(),
            };
            write_record(&mut writer, &codec.encode_entry(&entry).unwrap()).unwrap();
        }
        writer.flush().unwrap();
        writer.into_inner().unwrap().0
    }

    #[allow(clippy::type_complexity)]
    fn setup(
        bytes: Vec<u8>,
        workers: usize,
    ) -> (ReadLoop<Cursor<Vec<u8>>>, Vec<Receiver<DecodeTask>>, Arc<AtomicBool>) {
        let mut source = RecordReader::new(64, 1024);
        source.reset(Cursor::new(bytes));
        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        let mut pools = Vec::new();
        for _ in 0..workers {
            let (tx, rx) = bounded(64);
            senders.push(tx);
            receivers.push(rx);
            pools.push(BufferPool::new(65, 64));
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let read_loop = ReadLoop::new(
            source,
            Arc::new(MsgpackCodec::new()),
            senders,
            pools,
            Arc::clone(&cancel),
            64,
        );
        (read_loop, receivers, cancel)
    }

    fn routed_indices(rx: &Receiver<DecodeTask>) -> Vec<u64> {
        rx.iter()
            .filter_map(|task| match task {
                DecodeTask::Entry { unique_index, .. } => Some(unique_index),
                DecodeTask::Failed(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_routes_by_index_modulo() {
        let (read_loop, receivers, _) = setup(encode_stream(&[0, 1, 2, 3, 4, 5, 7, 3]), 3);
        read_loop.run();

        assert_eq!(routed_indices(&receivers[0]), vec![0, 3, 3]);
        assert_eq!(routed_indices(&receivers[1]), vec![1, 4, 7]);
        assert_eq!(routed_indices(&receivers[2]), vec![2, 5]);
    }

    #[test]
    fn test_cancelled_loop_closes_queues() {
        let (read_loop, receivers, cancel) = setup(encode_stream(&[1, 2, 3]), 2);
        cancel.store(true, Ordering::Release);
        let source = read_loop.run();

        assert!(source.has_source());
        for rx in &receivers {
            assert!(rx.recv().is_err());
        }
    }

    #[test]
    fn test_errors_forwarded_to_first_worker() {
        let mut bytes = encode_stream(&[5, 6]);
        // Corrupt the only chunk's payload.
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let (read_loop, receivers, _) = setup(bytes, 2);
        read_loop.run();

        let first: Vec<_> = receivers[0].iter().collect();
        assert_eq!(first.len(), 1);
        assert!(matches!(
            first[0],
            DecodeTask::Failed(CommitLogError::ChunkChecksumMismatch(_))
        ));
        assert_eq!(receivers[1].iter().count(), 0);
    }
}
