//! Units of work for the packer. Each block is processed exactly once and
//! produces exactly one block slot in the table of contents.

use std::io::{Seek, Write};

use crate::pack::context::PackingContext;
use crate::types::CompressionPreference;
use crate::Result;

pub mod chunked;
pub mod from_archive;
pub mod solid;

pub use chunked::{ChunkedBlockState, ChunkedFileBlock, DuplicateTarget};
pub use from_archive::{CarriedEntry, ChunkedFileFromExistingArchive, SolidBlockFromExistingArchive};
pub use solid::SolidBlock;

#[derive(Debug, Clone)]
pub enum Block {
    Solid(SolidBlock),
    Chunked(ChunkedFileBlock),
    SolidFromArchive(SolidBlockFromExistingArchive),
    ChunkedFromArchive(ChunkedFileFromExistingArchive),
}

impl Block {
    pub fn largest_item_size(&self) -> u64 {
        match self {
            Self::Solid(block) => block.largest_item_size(),
            Self::Chunked(block) => block.state().file().size(),
            Self::SolidFromArchive(block) => block.largest_item_size(),
            Self::ChunkedFromArchive(block) => block.carried().entry.decompressed_size,
        }
    }

    /// Files whose data lives (at least partly) in this block.
    pub fn file_count(&self) -> usize {
        match self {
            Self::Solid(block) => block.items().len(),
            Self::SolidFromArchive(block) => block.entries().len(),
            Self::Chunked(_) | Self::ChunkedFromArchive(_) => 1,
        }
    }

    /// True for blocks holding one slice of a larger file.
    pub fn can_create_chunks(&self) -> bool {
        matches!(self, Self::Chunked(_) | Self::ChunkedFromArchive(_))
    }

    pub fn compression(&self) -> CompressionPreference {
        match self {
            Self::Solid(block) => block.compression(),
            Self::Chunked(block) => block.state().compression(),
            Self::SolidFromArchive(block) => block.compression(),
            Self::ChunkedFromArchive(block) => block.compression(),
        }
    }

    /// Reads, compresses (or copies) and appends the block at `block_index`,
    /// then records its files in the table of contents.
    pub(crate) fn process<W: Write + Seek>(
        self,
        context: &PackingContext<W>,
        block_index: u32,
    ) -> Result<()> {
        match self {
            Self::Solid(block) => block.process(context, block_index),
            Self::Chunked(block) => block.process(context, block_index),
            Self::SolidFromArchive(block) => {
                context.with_dedup_turn(block_index, || ())?;
                block.process(context, block_index)
            }
            Self::ChunkedFromArchive(block) => {
                context.with_dedup_turn(block_index, || ())?;
                block.process(context, block_index)
            }
        }
    }
}
