use serde::{Deserialize, Serialize};

use crate::headers::bits::{LittleEndianReader, LittleEndianWriter, extract, insert};
use crate::types::CompressionPreference;
use crate::Result;

const BLOCK_OFFSET_SHIFT: u32 = 38;
const BLOCK_OFFSET_BITS: u32 = 26;
const PATH_INDEX_SHIFT: u32 = 18;
const PATH_INDEX_BITS: u32 = 20;
const FIRST_BLOCK_SHIFT: u32 = 0;
const FIRST_BLOCK_BITS: u32 = 18;

const COMPRESSION_TAG_BITS: u32 = 3;

/// Metadata for one logical file in an archive.
///
/// Chunked files still own exactly one entry; their chunks live in the
/// blocks `first_block_index..first_block_index + chunk_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileEntry {
    /// XXH64 of the full file contents.
    pub hash: u64,
    pub decompressed_size: u64,
    /// Offset of the file inside its decompressed SOLID block (u26).
    pub decompressed_block_offset: u32,
    /// Index into the sorted string pool (u20).
    pub file_path_index: u32,
    /// First block holding this file's bytes (u18).
    pub first_block_index: u32,
}

impl FileEntry {
    /// Number of blocks this file spans given the archive chunk size.
    pub fn chunk_count(&self, chunk_size: u32) -> u32 {
        if self.decompressed_size <= chunk_size as u64 {
            1
        } else {
            self.decompressed_size.div_ceil(chunk_size as u64) as u32
        }
    }

    /// True when the file spans more than one chunk.
    pub fn is_chunked(&self, chunk_size: u32) -> bool {
        self.chunk_count(chunk_size) > 1
    }

    pub(crate) fn packed_tuple(&self) -> OffsetPathIndexTuple {
        OffsetPathIndexTuple::new(
            self.decompressed_block_offset,
            self.file_path_index,
            self.first_block_index,
        )
    }

    pub(crate) fn write_v0(&self, writer: &mut LittleEndianWriter<'_>) {
        writer.write_u64(self.hash);
        writer.write_u32(self.decompressed_size as u32);
        writer.write_u64(self.packed_tuple().raw());
    }

    pub(crate) fn write_v1(&self, writer: &mut LittleEndianWriter<'_>) {
        writer.write_u64(self.hash);
        writer.write_u64(self.decompressed_size);
        writer.write_u64(self.packed_tuple().raw());
    }

    pub(crate) fn read_v0(reader: &mut LittleEndianReader<'_>) -> Self {
        let hash = reader.read_u64();
        let decompressed_size = reader.read_u32() as u64;
        let tuple = OffsetPathIndexTuple::from_raw(reader.read_u64());
        Self::from_parts(hash, decompressed_size, tuple)
    }

    pub(crate) fn read_v1(reader: &mut LittleEndianReader<'_>) -> Self {
        let hash = reader.read_u64();
        let decompressed_size = reader.read_u64();
        let tuple = OffsetPathIndexTuple::from_raw(reader.read_u64());
        Self::from_parts(hash, decompressed_size, tuple)
    }

    fn from_parts(hash: u64, decompressed_size: u64, tuple: OffsetPathIndexTuple) -> Self {
        Self {
            hash,
            decompressed_size,
            decompressed_block_offset: tuple.decompressed_block_offset(),
            file_path_index: tuple.file_path_index(),
            first_block_index: tuple.first_block_index(),
        }
    }
}

/// `decompressedBlockOffset:26 | filePathIndex:20 | firstBlockIndex:18` in one u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OffsetPathIndexTuple {
    packed: u64,
}

impl OffsetPathIndexTuple {
    /// Packs the three fields, truncating each to its width.
    ///
    /// # Arguments
    /// * `decompressed_block_offset` - Offset inside the decompressed SOLID block (26 bits)
    /// * `file_path_index` - Index into the string pool (20 bits)
    /// * `first_block_index` - Block holding the file or its first chunk (18 bits)
    pub fn new(decompressed_block_offset: u32, file_path_index: u32, first_block_index: u32) -> Self {
        let mut tuple = Self::default();
        tuple.set_decompressed_block_offset(decompressed_block_offset);
        tuple.set_file_path_index(file_path_index);
        tuple.set_first_block_index(first_block_index);
        tuple
    }

    pub fn from_raw(packed: u64) -> Self {
        Self { packed }
    }

    pub fn raw(&self) -> u64 {
        self.packed
    }

    pub fn decompressed_block_offset(&self) -> u32 {
        extract(self.packed, BLOCK_OFFSET_SHIFT, BLOCK_OFFSET_BITS) as u32
    }

    pub fn set_decompressed_block_offset(&mut self, value: u32) {
        self.packed = insert(self.packed, BLOCK_OFFSET_SHIFT, BLOCK_OFFSET_BITS, value as u64);
    }

    pub fn file_path_index(&self) -> u32 {
        extract(self.packed, PATH_INDEX_SHIFT, PATH_INDEX_BITS) as u32
    }

    pub fn set_file_path_index(&mut self, value: u32) {
        self.packed = insert(self.packed, PATH_INDEX_SHIFT, PATH_INDEX_BITS, value as u64);
    }

    pub fn first_block_index(&self) -> u32 {
        extract(self.packed, FIRST_BLOCK_SHIFT, FIRST_BLOCK_BITS) as u32
    }

    pub fn set_first_block_index(&mut self, value: u32) {
        self.packed = insert(self.packed, FIRST_BLOCK_SHIFT, FIRST_BLOCK_BITS, value as u64);
    }
}

/// Compressed size of one block as stored in the ToC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockSize {
    pub compressed_size: u32,
}

impl BlockSize {
    pub fn new(compressed_size: u32) -> Self {
        Self { compressed_size }
    }
}

/// Packs a block size and its compression tag: `compressedSize << 3 | tag`.
#[inline]
pub fn pack_block_word(block: BlockSize, compression: CompressionPreference) -> u32 {
    (block.compressed_size << COMPRESSION_TAG_BITS)
        | (compression.to_tag() as u32 & ((1 << COMPRESSION_TAG_BITS) - 1))
}

/// Splits a block word into size and codec.
///
/// # Errors
/// [`NxError::UnsupportedCompression`](crate::NxError::UnsupportedCompression) for an unknown tag.
#[inline]
pub fn unpack_block_word(word: u32) -> Result<(BlockSize, CompressionPreference)> {
    let compression =
        CompressionPreference::from_tag((word & ((1 << COMPRESSION_TAG_BITS) - 1)) as u8)?;
    Ok((BlockSize::new(word >> COMPRESSION_TAG_BITS), compression))
}
