use std::io::{Seek, Write};
use std::sync::Arc;

use crate::headers::FileEntry;
use crate::pack::context::PackingContext;
use crate::types::CompressionPreference;
use crate::unpack::NxSource;
use crate::Result;

/// A file entry of a source archive together with its path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarriedEntry {
    pub entry: FileEntry,
    pub relative_path: String,
}

/// A whole SOLID block of a source archive, copied without recompression.
///
/// Used when every file stored in the block is carried over.
#[derive(Debug, Clone)]
pub struct SolidBlockFromExistingArchive {
    source: Arc<NxSource>,
    source_block_index: u32,
    compression: CompressionPreference,
    entries: Vec<CarriedEntry>,
}

impl SolidBlockFromExistingArchive {
    pub fn new(
        source: Arc<NxSource>,
        source_block_index: u32,
        entries: Vec<CarriedEntry>,
    ) -> Result<Self> {
        let compression = source.block_compression(source_block_index)?;
        Ok(Self {
            source,
            source_block_index,
            compression,
            entries,
        })
    }

    pub fn source_block_index(&self) -> u32 {
        self.source_block_index
    }

    pub fn entries(&self) -> &[CarriedEntry] {
        &self.entries
    }

    pub fn compression(&self) -> CompressionPreference {
        self.compression
    }

    pub fn largest_item_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|carried| carried.entry.decompressed_size)
            .max()
            .unwrap_or(0)
    }

    /// Furthest decompressed byte used by any carried entry.
    pub fn decompressed_size(&self) -> u64 {
        self.entries
            .iter()
            .map(|carried| {
                carried.entry.decompressed_block_offset as u64 + carried.entry.decompressed_size
            })
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn process<W: Write + Seek>(
        self,
        context: &PackingContext<W>,
        block_index: u32,
    ) -> Result<()> {
        context.cancellation.check()?;
        let raw = self.source.raw_block(self.source_block_index)?;

        let mut turn = context.enter_turn(block_index)?;
        turn.write_block(&raw, self.compression)?;
        for carried in &self.entries {
            let file_path_index = turn.toc().file_path_index(&carried.relative_path)?;
            turn.toc().add_entry(FileEntry {
                file_path_index,
                first_block_index: block_index,
                ..carried.entry
            })?;
        }
        turn.complete()
    }
}

/// One chunk block of a chunked file in a source archive, copied verbatim.
#[derive(Debug, Clone)]
pub struct ChunkedFileFromExistingArchive {
    source: Arc<NxSource>,
    carried: Arc<CarriedEntry>,
    chunk_index: u32,
    num_chunks: u32,
    compression: CompressionPreference,
}

impl ChunkedFileFromExistingArchive {
    pub fn new(
        source: Arc<NxSource>,
        carried: Arc<CarriedEntry>,
        chunk_index: u32,
        num_chunks: u32,
    ) -> Result<Self> {
        let compression =
            source.block_compression(carried.entry.first_block_index + chunk_index)?;
        Ok(Self {
            source,
            carried,
            chunk_index,
            num_chunks,
            compression,
        })
    }

    pub fn carried(&self) -> &CarriedEntry {
        &self.carried
    }

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn num_chunks(&self) -> u32 {
        self.num_chunks
    }

    pub fn compression(&self) -> CompressionPreference {
        self.compression
    }

    pub fn source_block_index(&self) -> u32 {
        self.carried.entry.first_block_index + self.chunk_index
    }

    pub(crate) fn process<W: Write + Seek>(
        self,
        context: &PackingContext<W>,
        block_index: u32,
    ) -> Result<()> {
        context.cancellation.check()?;
        let raw = self.source.raw_block(self.source_block_index())?;

        let mut turn = context.enter_turn(block_index)?;
        turn.write_block(&raw, self.compression)?;
        if self.chunk_index + 1 == self.num_chunks {
            let file_path_index = turn.toc().file_path_index(&self.carried.relative_path)?;
            turn.toc().add_entry(FileEntry {
                file_path_index,
                first_block_index: block_index - self.chunk_index,
                ..self.carried.entry
            })?;
        }
        turn.complete()
    }
}
