pub mod blocks;
pub mod context;
pub mod dedup;
pub mod file;
pub mod grouping;
pub mod lazy_block;
pub mod packer;
pub mod repacker;
pub mod settings;
pub mod toc_builder;

pub use blocks::{
    Block, CarriedEntry, ChunkedBlockState, ChunkedFileBlock, ChunkedFileFromExistingArchive,
    SolidBlock, SolidBlockFromExistingArchive,
};
pub use dedup::{ChunkedDeduplicationState, SolidDeduplicationState, SolidLocation};
pub use file::PackerFile;
pub use grouping::{BlockOptions, group_files, make_blocks};
pub use lazy_block::{FromLazyBlockProvider, LazyDecompressedBlock};
pub use packer::NxPacker;
pub use repacker::NxRepackerBuilder;
pub use settings::{PackerSettings, ProgressReporter, ProgressSnapshot};
pub use toc_builder::TableOfContentsBuilder;
