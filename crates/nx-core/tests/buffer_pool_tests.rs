use std::sync::Arc;
use std::thread;

use nx_core::buffer::SHARED_RENTAL_THRESHOLD;
use nx_core::{BufferPool, NxError, PackerArrayPool};

#[test]
fn buffer_pool_recycles_buffers() {
    let pool = BufferPool::new(32, 4);

    {
        let mut buffer = pool.acquire();
        buffer.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(buffer.len(), 4);
        assert!(buffer.capacity() >= 32);
    }

    let metrics_after_first = pool.metrics();
    assert_eq!(metrics_after_first.created, 1);
    assert_eq!(metrics_after_first.recycled, 0);

    {
        let buffer = pool.acquire();
        assert!(buffer.is_empty(), "recycled buffers come back cleared");
    }

    let metrics_after_second = pool.metrics();
    assert_eq!(metrics_after_second.created, 1);
    assert_eq!(metrics_after_second.recycled, 1);
    assert_eq!(metrics_after_second.dropped, 0);
}

#[test]
fn buffer_pool_drops_when_free_list_is_full() {
    let pool = BufferPool::new(8, 2);
    let held: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
    drop(held);

    let metrics = pool.metrics();
    assert_eq!(metrics.created, 5);
    assert_eq!(metrics.dropped, 3);
    assert_eq!(pool.max_buffers(), 2);
    assert_eq!(pool.default_capacity(), 8);
}

#[test]
fn acquire_len_zero_fills() {
    let pool = BufferPool::new(16, 2);
    {
        let mut dirty = pool.acquire_len(10);
        dirty.fill(0xAB);
    }
    let clean = pool.acquire_len(12);
    assert_eq!(clean.as_slice(), &[0u8; 12]);
}

#[test]
fn buffer_pool_is_thread_safe() -> Result<(), Box<dyn std::error::Error>> {
    let pool = Arc::new(BufferPool::new(64, 8));
    let workers: Vec<_> = (0..8)
        .map(|seed| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for round in 0..200u32 {
                    let mut buffer = pool.acquire();
                    buffer.extend_from_slice(&(seed * 1000 + round).to_le_bytes());
                    assert_eq!(buffer.len(), 4);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().map_err(|_| "buffer worker panicked")?;
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.created + metrics.recycled, 8 * 200);
    assert!(metrics.created <= 8 + metrics.dropped);
    Ok(())
}

#[test]
fn small_rentals_use_the_shared_pool() -> Result<(), Box<dyn std::error::Error>> {
    let pool = PackerArrayPool::new(1);
    let first = pool.rent(1024)?;
    let second = pool.rent(SHARED_RENTAL_THRESHOLD - 1)?;

    assert!(!first.is_slot());
    assert!(!second.is_slot());
    assert_eq!(first.len(), 1024);
    assert_eq!(second.len(), SHARED_RENTAL_THRESHOLD - 1);
    assert_eq!(pool.rented_slots(), 0);
    Ok(())
}

#[test]
fn large_rentals_claim_slots_until_exhausted() -> Result<(), Box<dyn std::error::Error>> {
    let pool = PackerArrayPool::new(2);
    assert_eq!(pool.slot_count(), 2);

    let first = pool.rent(SHARED_RENTAL_THRESHOLD)?;
    let mut second = pool.rent(SHARED_RENTAL_THRESHOLD + 10)?;
    assert!(first.is_slot() && second.is_slot());
    assert_eq!(pool.rented_slots(), 2);
    assert_eq!(second.len(), SHARED_RENTAL_THRESHOLD + 10);

    match pool.rent(SHARED_RENTAL_THRESHOLD) {
        Err(NxError::PoolExhausted { slots }) => assert_eq!(slots, 2),
        other => panic!("expected PoolExhausted, got {other:?}"),
    }

    second.fill(0xCD);
    drop(second);
    assert_eq!(pool.rented_slots(), 1);

    let reused = pool.rent(SHARED_RENTAL_THRESHOLD)?;
    assert!(reused.is_slot());
    assert!(reused.iter().all(|byte| *byte == 0), "slot buffers are re-zeroed");
    drop(first);
    drop(reused);
    assert_eq!(pool.rented_slots(), 0);
    Ok(())
}

#[test]
fn zero_slot_request_still_has_one_slot() -> Result<(), Box<dyn std::error::Error>> {
    let pool = PackerArrayPool::new(0);
    assert_eq!(pool.slot_count(), 1);
    let rental = pool.rent(2 * SHARED_RENTAL_THRESHOLD)?;
    assert!(rental.is_slot());
    Ok(())
}
