use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::{CancellationToken, TurnGate, lock_unpoisoned};
use crate::headers::{
    BlockSize, FileEntry, MAX_BLOCK_COMPRESSED_SIZE, MAX_BLOCK_COUNT, MAX_FILE_COUNT,
    TableOfContents, TableOfContentsVersion, calculate_table_size, string_pool,
};
use crate::types::CompressionPreference;
use crate::{NxError, Result};

#[derive(Debug, Clone, Copy, Default)]
struct BlockRecord {
    size: BlockSize,
    compression: CompressionPreference,
}

/// Table of contents filled in while blocks are processed.
///
/// Entry and block arrays are sized up front. The block cursor doubles as
/// the turn token for ordered output: a block may only write its bytes and
/// metadata while [`current_block`](Self::current_block) equals its index.
#[derive(Debug)]
pub struct TableOfContentsBuilder {
    version: TableOfContentsVersion,
    pool: Vec<String>,
    compressed_pool: Vec<u8>,
    entries: Mutex<Vec<FileEntry>>,
    blocks: Mutex<Vec<BlockRecord>>,
    current_file: AtomicUsize,
    block_turn: TurnGate,
}

impl TableOfContentsBuilder {
    /// Builds the string pool for `paths` and reserves one entry per path
    /// and `block_count` block slots.
    pub fn new(
        paths: &[&str],
        block_count: usize,
        largest_file_size: u64,
        cancellation: CancellationToken,
    ) -> Result<Self> {
        if paths.len() > MAX_FILE_COUNT as usize {
            return Err(NxError::CapacityExceeded {
                what: "file",
                count: paths.len() as u64,
                max: MAX_FILE_COUNT as u64,
            });
        }
        if block_count > MAX_BLOCK_COUNT as usize {
            return Err(NxError::CapacityExceeded {
                what: "block",
                count: block_count as u64,
                max: MAX_BLOCK_COUNT as u64,
            });
        }

        let mut pool: Vec<String> = paths.iter().map(|path| (*path).to_owned()).collect();
        let compressed_pool = string_pool::pack(&mut pool)?;
        pool.dedup();

        Ok(Self {
            version: TableOfContentsVersion::for_largest_file(largest_file_size),
            pool,
            compressed_pool,
            entries: Mutex::new(vec![FileEntry::default(); paths.len()]),
            blocks: Mutex::new(vec![BlockRecord::default(); block_count]),
            current_file: AtomicUsize::new(0),
            block_turn: TurnGate::new(cancellation),
        })
    }

    pub fn version(&self) -> TableOfContentsVersion {
        self.version
    }

    pub fn file_count(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn block_count(&self) -> usize {
        lock_unpoisoned(&self.blocks).len()
    }

    /// Index of `path` in the sorted string pool.
    pub fn file_path_index(&self, path: &str) -> Result<u32> {
        self.pool
            .binary_search_by(|candidate| candidate.as_bytes().cmp(path.as_bytes()))
            .map(|index| index as u32)
            .map_err(|_| NxError::InvalidFormat("path missing from string pool"))
    }

    /// Reserves the next entry slot.
    pub fn get_and_increment_file_atomic(&self) -> Result<usize> {
        let slot = self.current_file.fetch_add(1, Ordering::AcqRel);
        let capacity = self.file_count();
        if slot >= capacity {
            return Err(NxError::CapacityExceeded {
                what: "file entry",
                count: slot as u64 + 1,
                max: capacity as u64,
            });
        }
        Ok(slot)
    }

    /// Stores `entry` in a slot reserved by [`Self::get_and_increment_file_atomic`].
    pub fn set_entry(&self, slot: usize, entry: FileEntry) -> Result<()> {
        let mut entries = lock_unpoisoned(&self.entries);
        let target = entries
            .get_mut(slot)
            .ok_or(NxError::InvalidFormat("file entry slot out of range"))?;
        *target = entry;
        Ok(())
    }

    /// Reserves a slot and stores `entry` in it.
    pub fn add_entry(&self, entry: FileEntry) -> Result<()> {
        let slot = self.get_and_increment_file_atomic()?;
        self.set_entry(slot, entry)
    }

    pub fn current_block(&self) -> u32 {
        self.block_turn.current()
    }

    /// Blocks until all blocks before `block_index` were written.
    pub fn wait_for_block_turn(&self, block_index: u32) -> Result<()> {
        self.block_turn.wait_for_turn(block_index)
    }

    /// Records a written block. Only the turn holder may call this.
    pub fn set_block(
        &self,
        block_index: u32,
        compressed_size: u64,
        compression: CompressionPreference,
    ) -> Result<()> {
        let current = self.current_block();
        if current != block_index {
            return Err(NxError::InvalidBlockId {
                expected: current as u64,
                actual: block_index as u64,
            });
        }
        if compressed_size > MAX_BLOCK_COMPRESSED_SIZE as u64 {
            return Err(NxError::CapacityExceeded {
                what: "compressed block byte",
                count: compressed_size,
                max: MAX_BLOCK_COMPRESSED_SIZE as u64,
            });
        }

        let mut blocks = lock_unpoisoned(&self.blocks);
        let record = blocks
            .get_mut(block_index as usize)
            .ok_or(NxError::InvalidFormat("block index out of range"))?;
        *record = BlockRecord {
            size: BlockSize::new(compressed_size as u32),
            compression: compression.or(CompressionPreference::Copy),
        };
        Ok(())
    }

    /// Ends the current block's turn, returning the index that finished.
    pub fn get_and_increment_block_index_atomic(&self) -> u32 {
        self.block_turn.advance()
    }

    /// Wakes every block waiting for its turn with a cancellation error.
    pub fn cancel(&self) {
        self.block_turn.cancel();
    }

    pub fn calculate_table_size(&self) -> usize {
        calculate_table_size(
            self.file_count(),
            self.block_count(),
            self.compressed_pool.len(),
            self.version,
        )
    }

    /// Serializes the finished table into `output`.
    ///
    /// # Errors
    /// Fails if any entry slot or block was never filled in.
    pub fn build(&self, output: &mut [u8]) -> Result<usize> {
        let entries = lock_unpoisoned(&self.entries);
        let blocks = lock_unpoisoned(&self.blocks);
        if self.current_file.load(Ordering::Acquire) != entries.len() {
            return Err(NxError::InvalidFormat("not every file entry was written"));
        }
        if self.current_block() as usize != blocks.len() {
            return Err(NxError::InvalidFormat("not every block was written"));
        }

        let sizes: Vec<BlockSize> = blocks.iter().map(|record| record.size).collect();
        let compressions: Vec<CompressionPreference> =
            blocks.iter().map(|record| record.compression).collect();
        TableOfContents::serialize_into(
            output,
            self.version,
            &entries,
            &sizes,
            &compressions,
            &self.compressed_pool,
        )
    }
}
