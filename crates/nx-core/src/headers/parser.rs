use std::ops::Deref;

use crate::headers::consts::{HEADER_PREFIX_SIZE, NATIVE_HEADER_SIZE, TOC_HEADER_SIZE, align_to_page};
use crate::headers::file_entry::BlockSize;
use crate::headers::native_header::NativeFileHeader;
use crate::headers::toc::{TableOfContents, calculate_table_size};
use crate::headers::toc_header::NativeTocHeader;
use crate::io::FileDataProvider;
use crate::{NxError, Result};

/// A fully parsed archive header with absolute block offsets.
#[derive(Debug, Clone)]
pub struct ParsedHeader {
    pub header: NativeFileHeader,
    pub toc: TableOfContents,
    /// Absolute offset of each block's compressed bytes in the archive.
    pub block_offsets: Vec<u64>,
}

impl Deref for ParsedHeader {
    type Target = TableOfContents;

    fn deref(&self) -> &Self::Target {
        &self.toc
    }
}

impl ParsedHeader {
    /// Reads the header through `provider`, trying a small prefix first and
    /// fetching the exact header length only when the ToC is larger.
    pub fn read_from(provider: &dyn FileDataProvider) -> Result<Self> {
        let prefix_len = (HEADER_PREFIX_SIZE as u64).min(provider.len());
        let prefix = provider.get_file_data(0, prefix_len)?;
        let required = required_header_size(&prefix)?;
        if required <= prefix.len() {
            return Self::parse(&prefix);
        }

        tracing::debug!(
            target: crate::telemetry::tags::TARGET_UNPACK,
            prefix_len,
            required,
            "header larger than prefix, reading full header"
        );
        if required as u64 > provider.len() {
            return Err(NxError::InvalidFormat("archive is shorter than its header"));
        }
        let full = provider.get_file_data(0, required as u64)?;
        Self::parse(&full)
    }

    /// Parses a header from bytes that start at offset 0 of the archive.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = NativeFileHeader::from_bytes(data)?;
        let toc = TableOfContents::deserialize(&data[NATIVE_HEADER_SIZE.min(data.len())..])?;
        if (NATIVE_HEADER_SIZE + toc.serialized_size()) as u64 > header.header_page_bytes() {
            return Err(NxError::InvalidFormat("ToC overflows its header pages"));
        }

        let block_offsets = compute_block_offsets(header.header_page_bytes(), &toc.blocks);
        Ok(Self {
            header,
            toc,
            block_offsets,
        })
    }

    pub fn block_size(&self) -> u32 {
        self.header.block_size()
    }

    pub fn chunk_size(&self) -> u32 {
        self.header.chunk_size()
    }

    /// Offset of block 0.
    pub fn header_page_bytes(&self) -> u64 {
        self.header.header_page_bytes()
    }

    /// Offset one past the last block, i.e. the expected archive length.
    pub fn archive_end(&self) -> u64 {
        match (self.block_offsets.last(), self.toc.blocks.last()) {
            (Some(offset), Some(block)) => align_to_page(offset + block.compressed_size as u64),
            _ => self.header_page_bytes(),
        }
    }
}

/// Number of bytes from offset 0 needed to parse the whole header and ToC.
pub fn required_header_size(prefix: &[u8]) -> Result<usize> {
    NativeFileHeader::from_bytes(prefix)?;
    if prefix.len() < NATIVE_HEADER_SIZE + TOC_HEADER_SIZE {
        return Err(NxError::InvalidFormat("archive header is truncated"));
    }

    let toc_header = NativeTocHeader::from_bytes(&prefix[NATIVE_HEADER_SIZE..])?;
    let table_size = calculate_table_size(
        toc_header.file_count() as usize,
        toc_header.block_count() as usize,
        toc_header.string_pool_size() as usize,
        toc_header.version()?,
    );
    Ok(NATIVE_HEADER_SIZE + table_size)
}

/// Cumulative block offsets; every block starts page aligned.
pub fn compute_block_offsets(header_page_bytes: u64, blocks: &[BlockSize]) -> Vec<u64> {
    let mut offsets = Vec::with_capacity(blocks.len());
    let mut current = header_page_bytes;
    for block in blocks {
        offsets.push(current);
        current = align_to_page(current + block.compressed_size as u64);
    }
    offsets
}
