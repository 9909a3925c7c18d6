use std::fmt;
use std::sync::Arc;

use crate::core::CancellationToken;
use crate::headers::{
    MAX_BLOCK_SIZE, MAX_CHUNK_SIZE, MIN_BLOCK_SIZE, MIN_CHUNK_SIZE, block_size_code,
    block_size_for_code, chunk_size_code, chunk_size_for_code,
};
use crate::telemetry::tags;
use crate::types::CompressionPreference;

pub const DEFAULT_BLOCK_SIZE: u32 = 1024 * 1024 - 1;
pub const DEFAULT_CHUNK_SIZE: u32 = 1024 * 1024;
pub const DEFAULT_ZSTANDARD_LEVEL: i32 = 16;
pub const DEFAULT_LZ4_LEVEL: i32 = 12;

pub const MIN_ZSTANDARD_LEVEL: i32 = 1;
pub const MAX_ZSTANDARD_LEVEL: i32 = 22;
pub const MIN_LZ4_LEVEL: i32 = 1;
pub const MAX_LZ4_LEVEL: i32 = 12;

/// Progress of a packing session, reported after every written block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub blocks_done: u32,
    pub blocks_total: u32,
    /// Archive bytes written so far, excluding the header.
    pub bytes_written: u64,
}

impl ProgressSnapshot {
    /// Share of blocks written, from 0.0 to 1.0. An empty session reports 1.0.
    pub fn fraction(&self) -> f64 {
        if self.blocks_total == 0 {
            1.0
        } else {
            self.blocks_done as f64 / self.blocks_total as f64
        }
    }
}

pub type ProgressReporter = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Options controlling how an archive is packed.
///
/// Out-of-range values are clamped by [`sanitize`](Self::sanitize), never
/// rejected.
#[derive(Clone)]
pub struct PackerSettings {
    /// Budget for SOLID blocks. Files larger than this are chunked.
    pub block_size: u32,
    pub chunk_size: u32,
    pub zstandard_level: i32,
    /// 1..=2 use the fast LZ4 encoder, 3..=12 use LZ4 HC.
    pub lz4_level: i32,
    pub solid_compression: CompressionPreference,
    pub chunked_compression: CompressionPreference,
    pub max_threads: usize,
    pub enable_solid_deduplication: bool,
    pub enable_chunked_deduplication: bool,
    pub progress: Option<ProgressReporter>,
    pub cancellation: Option<CancellationToken>,
}

impl Default for PackerSettings {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            zstandard_level: DEFAULT_ZSTANDARD_LEVEL,
            lz4_level: DEFAULT_LZ4_LEVEL,
            solid_compression: CompressionPreference::Zstandard,
            chunked_compression: CompressionPreference::Zstandard,
            max_threads: num_cpus::get().max(1),
            enable_solid_deduplication: true,
            enable_chunked_deduplication: true,
            progress: None,
            cancellation: None,
        }
    }
}

impl fmt::Debug for PackerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackerSettings")
            .field("block_size", &self.block_size)
            .field("chunk_size", &self.chunk_size)
            .field("zstandard_level", &self.zstandard_level)
            .field("lz4_level", &self.lz4_level)
            .field("solid_compression", &self.solid_compression)
            .field("chunked_compression", &self.chunked_compression)
            .field("max_threads", &self.max_threads)
            .field("enable_solid_deduplication", &self.enable_solid_deduplication)
            .field("enable_chunked_deduplication", &self.enable_chunked_deduplication)
            .field("progress", &self.progress.is_some())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}

impl PackerSettings {
    /// Sets the largest SOLID block size in bytes.
    ///
    /// Rounded to a representable size by [`Self::sanitize`].
    ///
    /// # Arguments
    /// * `block_size` - Requested size, 32767 to 64 MiB - 1
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the chunk size used to split large files.
    ///
    /// # Arguments
    /// * `chunk_size` - Requested size, 512 KiB to 64 MiB; rounded up to a power of two
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Caps the number of compression workers.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Uses `method` for both SOLID blocks and chunks.
    ///
    /// # Arguments
    /// * `method` - Codec applied to every block that is not stored as copy
    pub fn with_compression(mut self, method: CompressionPreference) -> Self {
        self.solid_compression = method;
        self.chunked_compression = method;
        self
    }

    /// Turns SOLID and chunked deduplication on or off together.
    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.enable_solid_deduplication = enabled;
        self.enable_chunked_deduplication = enabled;
        self
    }

    /// Registers a callback invoked after each block is written.
    pub fn with_progress(mut self, reporter: ProgressReporter) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Lets the caller stop the session through `token`.
    ///
    /// The packer works on a child of `token`: internal failures stop the
    /// session without cancelling the caller's token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Level handed to the codec for `method`.
    pub fn level_for(&self, method: CompressionPreference) -> i32 {
        match method {
            CompressionPreference::Lz4 => self.lz4_level,
            _ => self.zstandard_level,
        }
    }

    /// Clamps every value into the range the archive format can represent.
    pub fn sanitize(&mut self) {
        let block_size = block_size_for_code(block_size_code(
            self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE),
        ));
        if block_size != self.block_size {
            tracing::warn!(
                target: tags::TARGET_PACK,
                requested = self.block_size,
                used = block_size,
                "block size adjusted"
            );
            self.block_size = block_size;
        }

        let mut chunk_size = chunk_size_for_code(chunk_size_code(
            self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE),
        ));
        if chunk_size <= self.block_size {
            chunk_size = self.block_size + 1;
        }
        if chunk_size != self.chunk_size {
            tracing::warn!(
                target: tags::TARGET_PACK,
                requested = self.chunk_size,
                used = chunk_size,
                "chunk size adjusted"
            );
            self.chunk_size = chunk_size;
        }

        let zstandard_level = self
            .zstandard_level
            .clamp(MIN_ZSTANDARD_LEVEL, MAX_ZSTANDARD_LEVEL);
        if zstandard_level != self.zstandard_level {
            tracing::warn!(
                target: tags::TARGET_PACK,
                requested = self.zstandard_level,
                used = zstandard_level,
                "zstandard level clamped"
            );
            self.zstandard_level = zstandard_level;
        }

        let lz4_level = self.lz4_level.clamp(MIN_LZ4_LEVEL, MAX_LZ4_LEVEL);
        if lz4_level != self.lz4_level {
            tracing::warn!(
                target: tags::TARGET_PACK,
                requested = self.lz4_level,
                used = lz4_level,
                "lz4 level clamped"
            );
            self.lz4_level = lz4_level;
        }

        if self.max_threads == 0 {
            tracing::warn!(target: tags::TARGET_PACK, "thread count raised to 1");
            self.max_threads = 1;
        }

        self.solid_compression = self.solid_compression.or(CompressionPreference::Zstandard);
        self.chunked_compression = self
            .chunked_compression
            .or(CompressionPreference::Zstandard);
    }
}
