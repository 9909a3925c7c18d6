use std::path::Path;
use std::sync::Arc;

use crate::compression;
use crate::headers::ParsedHeader;
use crate::io::{FileDataProvider, FromFilePathProvider};
use crate::types::{CompressionPreference, FileData};
use crate::{NxError, Result};

/// An opened archive: its data provider and parsed header.
#[derive(Debug, Clone)]
pub struct NxSource {
    provider: Arc<dyn FileDataProvider>,
    header: ParsedHeader,
}

impl NxSource {
    /// Parses the header and ToC served by `provider`.
    ///
    /// # Arguments
    /// * `provider` - Byte source for the whole archive
    ///
    /// # Errors
    /// [`NxError::InvalidFormat`] if the provider ends before the last block.
    pub fn open(provider: Arc<dyn FileDataProvider>) -> Result<Self> {
        let header = ParsedHeader::read_from(provider.as_ref())?;
        if header.archive_end() > provider.len() {
            return Err(NxError::InvalidFormat("archive is shorter than its blocks"));
        }
        Ok(Self { provider, header })
    }

    /// Memory-maps the archive at `path` and opens it.
    pub fn open_path(path: &Path) -> Result<Self> {
        let provider = FromFilePathProvider::new(path)?;
        Self::open(Arc::new(provider))
    }

    /// Parsed header and table of contents.
    pub fn header(&self) -> &ParsedHeader {
        &self.header
    }

    pub fn provider(&self) -> &Arc<dyn FileDataProvider> {
        &self.provider
    }

    /// Number of blocks in the archive.
    pub fn block_count(&self) -> usize {
        self.header.blocks.len()
    }

    /// Codec used to store `block_index`.
    pub fn block_compression(&self, block_index: u32) -> Result<CompressionPreference> {
        self.header
            .block_compressions
            .get(block_index as usize)
            .copied()
            .ok_or(NxError::InvalidFormat("block index out of range"))
    }

    /// Compressed bytes of one block, exactly as stored.
    pub fn raw_block(&self, block_index: u32) -> Result<FileData> {
        let index = block_index as usize;
        let (offset, block) = self
            .header
            .block_offsets
            .get(index)
            .zip(self.header.blocks.get(index))
            .ok_or(NxError::InvalidFormat("block index out of range"))?;
        self.provider
            .get_file_data(*offset, block.compressed_size as u64)
    }

    /// Decompresses the first `len` bytes of a block.
    pub fn decompress_block(&self, block_index: u32, len: usize) -> Result<Vec<u8>> {
        let mut output = vec![0u8; len];
        self.decompress_block_into(block_index, &mut output)?;
        Ok(output)
    }

    /// Fills `output` with the leading decompressed bytes of a block.
    pub fn decompress_block_into(&self, block_index: u32, output: &mut [u8]) -> Result<()> {
        if output.is_empty() {
            return Ok(());
        }
        let method = self.block_compression(block_index)?;
        let raw = self.raw_block(block_index)?;
        let capacity = output.len().max(self.header.block_size() as usize);
        compression::decompress_partial(method, &raw, output, capacity)
            .map_err(|err| err.with_context(format!("block {block_index}")))
    }
}
