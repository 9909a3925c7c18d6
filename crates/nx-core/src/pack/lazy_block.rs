use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;

use crate::core::lock_unpoisoned;
use crate::io::FileDataProvider;
use crate::telemetry::{self, tags};
use crate::types::FileData;
use crate::unpack::NxSource;
use crate::{NxError, Result};

/// A block of an existing archive, decompressed on first use and shared by
/// every file carried over from it.
///
/// Each [`FromLazyBlockProvider`] holds an `Arc` to the block, so the
/// decompressed bytes are freed when the last of those files is dropped.
pub struct LazyDecompressedBlock {
    source: Arc<NxSource>,
    block_index: u32,
    decompressed_len: usize,
    data: OnceLock<Bytes>,
    init: Mutex<()>,
}

impl LazyDecompressedBlock {
    /// `decompressed_len` is the furthest byte any user of the block needs.
    pub fn new(source: Arc<NxSource>, block_index: u32, decompressed_len: usize) -> Self {
        Self {
            source,
            block_index,
            decompressed_len,
            data: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    /// True once some reader has triggered decompression.
    pub fn is_decompressed(&self) -> bool {
        self.data.get().is_some()
    }

    /// Decompressed bytes, decompressing the block if no caller has yet.
    pub fn get(&self) -> Result<&Bytes> {
        if let Some(data) = self.data.get() {
            return Ok(data);
        }

        let _guard = lock_unpoisoned(&self.init);
        if let Some(data) = self.data.get() {
            return Ok(data);
        }

        let decompressed = self
            .source
            .decompress_block(self.block_index, self.decompressed_len)?;
        telemetry::increment_counter(tags::METRIC_LAZY_BLOCK_DECOMPRESS_COUNT, 1);
        tracing::debug!(
            target: tags::TARGET_REPACK,
            block_index = self.block_index,
            len = self.decompressed_len,
            "decompressed source block for partial reuse"
        );
        let _ = self.data.set(Bytes::from(decompressed));
        self.data
            .get()
            .ok_or(NxError::InvalidFormat("lazy block failed to initialize"))
    }
}

impl fmt::Debug for LazyDecompressedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyDecompressedBlock")
            .field("block_index", &self.block_index)
            .field("decompressed_len", &self.decompressed_len)
            .field("decompressed", &self.is_decompressed())
            .finish()
    }
}

/// One file's range inside a [`LazyDecompressedBlock`].
#[derive(Debug, Clone)]
pub struct FromLazyBlockProvider {
    block: Arc<LazyDecompressedBlock>,
    offset: u64,
    len: u64,
}

impl FromLazyBlockProvider {
    /// Serves `len` bytes starting at `offset` inside the shared block.
    ///
    /// The block stays alive while any provider holding it does.
    ///
    /// # Arguments
    /// * `block` - Block shared by every file it contains
    /// * `offset` - Start of the file inside the decompressed block
    /// * `len` - Size of the file
    pub fn new(block: Arc<LazyDecompressedBlock>, offset: u64, len: u64) -> Self {
        Self { block, offset, len }
    }
}

impl FileDataProvider for FromLazyBlockProvider {
    fn get_file_data(&self, start: u64, len: u64) -> Result<FileData> {
        let end = start
            .checked_add(len)
            .filter(|end| *end <= self.len)
            .ok_or(NxError::InvalidFormat("file data range past end of source"))?;
        if len == 0 {
            return Ok(FileData::empty());
        }

        let data = self.block.get()?;
        let from = (self.offset + start) as usize;
        let to = (self.offset + end) as usize;
        if to > data.len() {
            return Err(NxError::InvalidFormat("file range past decompressed block"));
        }
        Ok(FileData::Owned(data.slice(from..to)))
    }

    fn len(&self) -> u64 {
        self.len
    }
}
