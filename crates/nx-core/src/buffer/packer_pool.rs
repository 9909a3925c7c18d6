use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::pool::{BufferPool, PooledBuffer};
use crate::core::lock_unpoisoned;
use crate::telemetry::{self, tags};
use crate::{NxError, Result};

/// Rentals smaller than this are served from the shared [`BufferPool`].
pub const SHARED_RENTAL_THRESHOLD: usize = 1024 * 1024;

const SHARED_POOL_MAX_BUFFERS: usize = 64;

#[derive(Debug, Default)]
struct Slot {
    claimed: AtomicBool,
    buffer: Mutex<Vec<u8>>,
}

/// Fixed set of large buffers, one per concurrent worker.
///
/// Each slot is claimed with a compare-and-swap and released when the
/// [`PackerPoolRental`] drops. Slot memory is kept between rentals, so after
/// warm-up a packing session stops allocating block-sized buffers.
#[derive(Debug)]
pub struct PackerArrayPool {
    slots: Box<[Slot]>,
    shared: BufferPool,
}

impl PackerArrayPool {
    pub fn new(slot_count: usize) -> Self {
        let slots = (0..slot_count.max(1)).map(|_| Slot::default()).collect();
        Self {
            slots,
            shared: BufferPool::new(SHARED_RENTAL_THRESHOLD, SHARED_POOL_MAX_BUFFERS),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently rented out.
    pub fn rented_slots(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.claimed.load(Ordering::Acquire))
            .count()
    }

    /// Rents a zero-filled buffer of exactly `len` bytes.
    ///
    /// # Errors
    /// [`NxError::PoolExhausted`] when a large rental finds every slot taken.
    /// The pool holds one slot per worker, so this means more rentals are
    /// alive than the scheduler allows and packing cannot continue.
    pub fn rent(&self, len: usize) -> Result<PackerPoolRental<'_>> {
        if len < SHARED_RENTAL_THRESHOLD {
            telemetry::increment_counter(tags::METRIC_POOL_RENT_SHARED_COUNT, 1);
            return Ok(PackerPoolRental {
                inner: RentalInner::Shared(self.shared.acquire_len(len)),
            });
        }

        for (index, slot) in self.slots.iter().enumerate() {
            if slot
                .claimed
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let mut buffer = std::mem::take(&mut *lock_unpoisoned(&slot.buffer));
            buffer.clear();
            buffer.resize(len, 0);
            telemetry::increment_counter(tags::METRIC_POOL_RENT_SLOT_COUNT, 1);
            return Ok(PackerPoolRental {
                inner: RentalInner::Slot {
                    pool: self,
                    index,
                    buffer,
                },
            });
        }

        tracing::error!(
            target: tags::TARGET_POOL,
            slots = self.slots.len(),
            requested = len,
            "packer buffer pool exhausted"
        );
        Err(NxError::PoolExhausted {
            slots: self.slots.len(),
        })
    }

    fn release(&self, index: usize, buffer: Vec<u8>) {
        let slot = &self.slots[index];
        *lock_unpoisoned(&slot.buffer) = buffer;
        slot.claimed.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
enum RentalInner<'a> {
    Slot {
        pool: &'a PackerArrayPool,
        index: usize,
        buffer: Vec<u8>,
    },
    Shared(PooledBuffer),
}

/// A buffer on loan from a [`PackerArrayPool`]; returned on drop.
#[derive(Debug)]
pub struct PackerPoolRental<'a> {
    inner: RentalInner<'a>,
}

impl PackerPoolRental<'_> {
    /// True when the rental occupies one of the fixed slots.
    pub fn is_slot(&self) -> bool {
        matches!(self.inner, RentalInner::Slot { .. })
    }
}

impl Deref for PackerPoolRental<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        match &self.inner {
            RentalInner::Slot { buffer, .. } => buffer,
            RentalInner::Shared(buffer) => buffer,
        }
    }
}

impl DerefMut for PackerPoolRental<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.inner {
            RentalInner::Slot { buffer, .. } => buffer,
            RentalInner::Shared(buffer) => buffer,
        }
    }
}

impl Drop for PackerPoolRental<'_> {
    fn drop(&mut self) {
        if let RentalInner::Slot {
            pool,
            index,
            buffer,
        } = &mut self.inner
        {
            pool.release(*index, std::mem::take(buffer));
        }
    }
}

/// Buffer pools used by block processing: raw block input and compressed output.
#[derive(Debug)]
pub struct PackerBuffers {
    pub input: PackerArrayPool,
    pub output: PackerArrayPool,
}

impl PackerBuffers {
    pub fn new(workers: usize) -> Self {
        Self {
            input: PackerArrayPool::new(workers),
            output: PackerArrayPool::new(workers),
        }
    }
}
