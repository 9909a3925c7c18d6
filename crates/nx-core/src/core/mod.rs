use std::sync::{Mutex, MutexGuard};

pub mod cancel;
pub mod turn;
pub mod worker_pool;

pub use cancel::CancellationToken;
pub use turn::TurnGate;
pub use worker_pool::{PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle};

/// Locks `mutex`, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
