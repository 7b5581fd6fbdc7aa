//! Fixed-capacity byte buffer pools.
//!
//! Each decode worker owns one pool. The read loop blocks in
//! [`BufferPool::acquire`] when every buffer is in flight, which bounds the
//! bytes queued per worker regardless of how slowly the caller consumes.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::ops::Deref;
use std::sync::Arc;

/// Free list of reusable byte buffers.
pub struct BufferPool {
    free_tx: Sender<Vec<u8>>,
    free_rx: Receiver<Vec<u8>>,
    capacity: usize,
    buffer_size: usize,
}

impl BufferPool {
    /// Create a pool holding `capacity` buffers of `buffer_size` bytes each.
    pub fn new(capacity: usize, buffer_size: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (free_tx, free_rx) = bounded(capacity);
        for _ in 0..capacity {
            // Cannot fail: the channel has room for exactly `capacity` items.
            let _ = free_tx.try_send(Vec::with_capacity(buffer_size));
        }
        Arc::new(BufferPool {
            free_tx,
            free_rx,
            capacity,
            buffer_size,
        })
    }

    /// Take a buffer, blocking until one is returned if the pool is empty.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let buf = self
            .free_rx
            .recv()
            .unwrap_or_else(|_| Vec::with_capacity(self.buffer_size));
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Buffers currently free.
    pub fn available(&self) -> usize {
        self.free_rx.len()
    }

    /// Total buffers owned by the pool.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        let _ = self.free_tx.try_send(buf);
    }
}

/// A buffer on loan from a [`BufferPool`].
///
/// Returned to its pool when dropped, on every exit path.
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// Replace the contents with `data`, growing the allocation if needed.
    pub fn fill_from(&mut self, data: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(data);
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_buffers_return_on_drop() {
        let pool = BufferPool::new(2, 16);
        assert_eq!(pool.available(), 2);
        {
            let _a = pool.acquire();
            let _b = pool.acquire();
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_fill_grows_and_reuses() {
        let pool = BufferPool::new(1, 4);
        {
            let mut buf = pool.acquire();
            buf.fill_from(b"larger than four");
            assert_eq!(&*buf, b"larger than four");
        }
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert!(buf.buf.capacity() >= 16);
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let pool = BufferPool::new(1, 8);
        let held = pool.acquire();

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let buf = pool.acquire();
                buf.len()
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(held);
        assert_eq!(waiter.join().unwrap(), 0);
    }
}
