use std::collections::HashMap;
use std::sync::Arc;

use crate::pack::blocks::{Block, ChunkedBlockState, ChunkedFileBlock, SolidBlock};
use crate::pack::file::PackerFile;
use crate::pack::settings::PackerSettings;
use crate::types::{CompressionPreference, SolidPreference};

/// Sizes and algorithms that shape block building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOptions {
    /// SOLID budget; larger files are chunked.
    pub block_size: u32,
    pub chunk_size: u32,
    pub solid_compression: CompressionPreference,
    pub chunked_compression: CompressionPreference,
}

impl From<&PackerSettings> for BlockOptions {
    fn from(settings: &PackerSettings) -> Self {
        Self {
            block_size: settings.block_size,
            chunk_size: settings.chunk_size,
            solid_compression: settings.solid_compression,
            chunked_compression: settings.chunked_compression,
        }
    }
}

/// Sorts files by ascending size, then groups them by extension.
///
/// Groups appear in the order their extension is first seen; files keep
/// their ascending order inside a group.
pub fn group_files(mut files: Vec<PackerFile>) -> Vec<Vec<PackerFile>> {
    files.sort_by_key(PackerFile::size);

    let mut group_of: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<PackerFile>> = Vec::new();
    for file in files {
        let index = match group_of.get(file.extension()) {
            Some(index) => *index,
            None => {
                group_of.insert(file.extension().to_owned(), groups.len());
                groups.push(Vec::new());
                groups.len() - 1
            }
        };
        groups[index].push(file);
    }
    groups
}

/// Folds grouped files into blocks.
///
/// Within each group, files larger than the block size become chunked
/// blocks, `NoSolid` files get a block each, and the rest fill SOLID blocks
/// greedily; a block is sealed before the file that would push it over
/// budget. SOLID blocks come first, largest first; chunked blocks follow in
/// creation order so every file's chunks stay consecutive.
pub fn make_blocks(groups: Vec<Vec<PackerFile>>, options: &BlockOptions) -> Vec<Block> {
    let block_size = options.block_size as u64;
    let mut solid_blocks: Vec<SolidBlock> = Vec::new();
    let mut chunked_blocks: Vec<Block> = Vec::new();

    for group in groups {
        let mut current: Vec<PackerFile> = Vec::new();
        let mut current_size = 0u64;

        for file in group {
            if file.size() > block_size {
                chunked_blocks.extend(make_chunks(file, options));
                continue;
            }

            if file.solid_preference() == SolidPreference::NoSolid {
                let compression = file
                    .compression_preference()
                    .or(options.solid_compression);
                solid_blocks.push(SolidBlock::new(vec![file], compression));
                continue;
            }

            if !current.is_empty() && current_size + file.size() > block_size {
                solid_blocks.push(SolidBlock::new(
                    std::mem::take(&mut current),
                    options.solid_compression,
                ));
                current_size = 0;
            }
            current_size += file.size();
            current.push(file);
        }

        if !current.is_empty() {
            solid_blocks.push(SolidBlock::new(current, options.solid_compression));
        }
    }

    solid_blocks.sort_by(|left, right| right.decompressed_size().cmp(&left.decompressed_size()));
    solid_blocks
        .into_iter()
        .map(Block::Solid)
        .chain(chunked_blocks)
        .collect()
}

fn make_chunks(file: PackerFile, options: &BlockOptions) -> Vec<Block> {
    let chunk_size = options.chunk_size.max(1) as u64;
    let size = file.size();
    let num_chunks = size.div_ceil(chunk_size).max(1) as u32;
    let compression = file
        .compression_preference()
        .or(options.chunked_compression);
    let state = Arc::new(ChunkedBlockState::new(
        file,
        num_chunks,
        chunk_size as u32,
        compression,
    ));

    (0..num_chunks)
        .map(|chunk_index| {
            let start = chunk_index as u64 * chunk_size;
            let len = (size - start).min(chunk_size) as u32;
            Block::Chunked(ChunkedFileBlock::new(
                Arc::clone(&state),
                start,
                len,
                chunk_index,
            ))
        })
        .collect()
}
