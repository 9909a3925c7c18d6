use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

use crate::telemetry::{self, tags};

/// Shared free list of byte vectors for small, short-lived scratch space.
///
/// Buffers go back to the list when their [`PooledBuffer`] is dropped. Once
/// `max_buffers` are waiting, further returns are freed instead.
///
/// # Example
/// ```
/// use nx_core::BufferPool;
///
/// let pool = BufferPool::new(4096, 16);
/// let mut buffer = pool.acquire();
/// buffer.extend_from_slice(b"scratch");
/// drop(buffer);
/// assert_eq!(pool.metrics().created, 1);
/// ```
#[derive(Debug)]
pub struct BufferPool {
    recycler: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    default_capacity: usize,
    max_buffers: usize,
    metrics: Arc<PoolMetricsInner>,
}

impl BufferPool {
    pub fn new(default_capacity: usize, max_buffers: usize) -> Self {
        let (tx, rx) = bounded(max_buffers);
        Self {
            recycler: tx,
            receiver: rx,
            default_capacity,
            max_buffers,
            metrics: Arc::new(PoolMetricsInner::default()),
        }
    }

    /// Takes a cleared buffer off the free list, or allocates one.
    pub fn acquire(&self) -> PooledBuffer {
        let buffer = match self.receiver.try_recv() {
            Ok(mut buffer) => {
                buffer.clear();
                self.metrics.recycled.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT, 1);
                buffer
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                self.metrics.created.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT, 1);
                Vec::with_capacity(self.default_capacity)
            }
        };

        PooledBuffer::new(buffer, self.recycler.clone(), Arc::clone(&self.metrics))
    }

    /// Like [`acquire`](Self::acquire) but resized to exactly `len` zeroed bytes.
    pub fn acquire_len(&self, len: usize) -> PooledBuffer {
        let mut buffer = self.acquire();
        buffer.resize(len, 0);
        buffer
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            created: self.metrics.created.load(Ordering::Relaxed),
            recycled: self.metrics.recycled.load(Ordering::Relaxed),
            dropped: self.metrics.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    pub created: usize,
    pub recycled: usize,
    /// Buffers freed because the free list was full.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    created: AtomicUsize,
    recycled: AtomicUsize,
    dropped: AtomicUsize,
}

/// A buffer on loan from a [`BufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buffer: Vec<u8>,
    recycler: Sender<Vec<u8>>,
    metrics: Arc<PoolMetricsInner>,
}

impl PooledBuffer {
    fn new(buffer: Vec<u8>, recycler: Sender<Vec<u8>>, metrics: Arc<PoolMetricsInner>) -> Self {
        Self {
            buffer,
            recycler,
            metrics,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.buffer
    }
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        if self.recycler.try_send(buffer).is_err() {
            self.metrics.dropped.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_counter(tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT, 1);
        }
    }
}
