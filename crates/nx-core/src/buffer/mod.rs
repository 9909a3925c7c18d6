pub mod packer_pool;
pub mod pool;

pub use packer_pool::{PackerArrayPool, PackerBuffers, PackerPoolRental, SHARED_RENTAL_THRESHOLD};
pub use pool::{BufferPool, PoolMetricsSnapshot, PooledBuffer};
