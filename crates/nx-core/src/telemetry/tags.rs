/// Tracing target for packing progress and block scheduling.
pub const TARGET_PACK: &str = "nx::pack";
/// Tracing target for extraction.
pub const TARGET_UNPACK: &str = "nx::unpack";
/// Tracing target for archive-to-archive repacking.
pub const TARGET_REPACK: &str = "nx::repack";
/// Tracing target for per-block processing.
pub const TARGET_BLOCK: &str = "nx::block";
/// Tracing target for buffer pools and worker threads.
pub const TARGET_POOL: &str = "nx::pool";

pub const METRIC_BLOCK_WRITE_COUNT: &str = "nx.block.write.count";
pub const METRIC_BLOCK_WRITE_BYTES: &str = "nx.block.write.bytes";
pub const METRIC_BLOCK_EXTRACT_COUNT: &str = "nx.block.extract.count";

pub const METRIC_COMPRESSION_APPLY_COUNT: &str = "nx.compression.apply.count";
pub const METRIC_COMPRESSION_APPLY_LATENCY_US: &str = "nx.compression.apply.latency_us";
pub const METRIC_COMPRESSION_REVERSE_COUNT: &str = "nx.compression.reverse.count";
pub const METRIC_COMPRESSION_REVERSE_LATENCY_US: &str = "nx.compression.reverse.latency_us";
pub const METRIC_COMPRESSION_COPY_FALLBACK_COUNT: &str = "nx.compression.copy_fallback.count";

pub const METRIC_DEDUP_SOLID_HIT_COUNT: &str = "nx.dedup.solid.hit.count";
pub const METRIC_DEDUP_CHUNKED_HIT_COUNT: &str = "nx.dedup.chunked.hit.count";
pub const METRIC_DEDUP_SHORT_HASH_COLLISION_COUNT: &str = "nx.dedup.short_hash.collision.count";

pub const METRIC_POOL_RENT_SLOT_COUNT: &str = "nx.pool.rent.slot.count";
pub const METRIC_POOL_RENT_SHARED_COUNT: &str = "nx.pool.rent.shared.count";
pub const METRIC_BUFFER_ACQUIRE_CREATED_COUNT: &str = "nx.buffer.acquire.created.count";
pub const METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT: &str = "nx.buffer.acquire.recycled.count";
pub const METRIC_BUFFER_RECYCLE_DROPPED_COUNT: &str = "nx.buffer.recycle.dropped.count";

pub const METRIC_STRING_POOL_PACK_LATENCY_US: &str = "nx.string_pool.pack.latency_us";
pub const METRIC_LAZY_BLOCK_DECOMPRESS_COUNT: &str = "nx.lazy_block.decompress.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "nx.worker.task.latency_us";
