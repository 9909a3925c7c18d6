use serde::{Deserialize, Serialize};

use crate::headers::TableOfContentsVersion;
use crate::types::CompressionPreference;
use crate::unpack::NxSource;

/// One file of an archive as shown by `nx list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedFile {
    pub path: String,
    pub size: u64,
    pub hash: u64,
    pub first_block_index: u32,
    pub block_offset: u32,
    pub chunk_count: u32,
    pub compression: CompressionPreference,
}

/// Summary of an archive's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveListing {
    pub block_size: u32,
    pub chunk_size: u32,
    pub toc_version: TableOfContentsVersion,
    pub block_count: usize,
    pub compressed_bytes: u64,
    pub files: Vec<ListedFile>,
}

impl ArchiveListing {
    /// Builds a listing from the parsed ToC without touching any block.
    pub fn from_source(source: &NxSource) -> Self {
        let header = source.header();
        let chunk_size = header.chunk_size();
        let mut files: Vec<ListedFile> = header
            .entries
            .iter()
            .map(|entry| ListedFile {
                path: header.path_of(entry).unwrap_or_default().to_owned(),
                size: entry.decompressed_size,
                hash: entry.hash,
                first_block_index: entry.first_block_index,
                block_offset: entry.decompressed_block_offset,
                chunk_count: entry.chunk_count(chunk_size),
                compression: header
                    .block_compressions
                    .get(entry.first_block_index as usize)
                    .copied()
                    .unwrap_or_default(),
            })
            .collect();
        files.sort_by(|left, right| left.path.cmp(&right.path));

        Self {
            block_size: header.block_size(),
            chunk_size,
            toc_version: header.version,
            block_count: header.blocks.len(),
            compressed_bytes: header
                .blocks
                .iter()
                .map(|block| block.compressed_size as u64)
                .sum(),
            files,
        }
    }

    /// Sum of all decompressed file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}
