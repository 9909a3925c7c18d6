use std::collections::BTreeMap;
use std::sync::Arc;

use crate::io::OutputDataProvider;

/// One byte range of a decompressed block destined for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractTarget {
    pub output_index: usize,
    /// Start of the range inside the decompressed block.
    pub block_offset: u64,
    /// Where the range goes in the output file.
    pub file_offset: u64,
    pub len: u64,
}

/// A block that must be decompressed once to serve one or more outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractableBlock {
    pub block_index: u32,
    /// Leading bytes of the block that have to be decompressed.
    pub decompressed_len: u64,
    pub targets: Vec<ExtractTarget>,
}

/// Groups the ranges every output needs by the block holding them.
///
/// Blocks come back in ascending index order. Zero-length files need no
/// block and produce no targets.
pub fn plan_extraction(
    outputs: &[Arc<dyn OutputDataProvider>],
    chunk_size: u32,
) -> Vec<ExtractableBlock> {
    let mut blocks: BTreeMap<u32, ExtractableBlock> = BTreeMap::new();
    let mut add = |block_index: u32, target: ExtractTarget| {
        let block = blocks.entry(block_index).or_insert_with(|| ExtractableBlock {
            block_index,
            decompressed_len: 0,
            targets: Vec::new(),
        });
        block.decompressed_len = block
            .decompressed_len
            .max(target.block_offset + target.len);
        block.targets.push(target);
    };

    for (output_index, output) in outputs.iter().enumerate() {
        let entry = output.entry();
        if entry.decompressed_size == 0 {
            continue;
        }

        let num_chunks = entry.chunk_count(chunk_size);
        if num_chunks <= 1 {
            add(
                entry.first_block_index,
                ExtractTarget {
                    output_index,
                    block_offset: entry.decompressed_block_offset as u64,
                    file_offset: 0,
                    len: entry.decompressed_size,
                },
            );
            continue;
        }

        let chunk_size = chunk_size as u64;
        for chunk_index in 0..num_chunks {
            let file_offset = chunk_index as u64 * chunk_size;
            add(
                entry.first_block_index + chunk_index,
                ExtractTarget {
                    output_index,
                    block_offset: 0,
                    file_offset,
                    len: (entry.decompressed_size - file_offset).min(chunk_size),
                },
            );
        }
    }

    blocks.into_values().collect()
}
