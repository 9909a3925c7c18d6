use serde::{Deserialize, Serialize};

use crate::headers::bits::{extract, insert};
use crate::headers::consts::{FILE_ENTRY_SIZE_V0, FILE_ENTRY_SIZE_V1, TOC_HEADER_SIZE};
use crate::{NxError, Result};

const FILE_COUNT_SHIFT: u32 = 44;
const FILE_COUNT_BITS: u32 = 20;
const BLOCK_COUNT_SHIFT: u32 = 26;
const BLOCK_COUNT_BITS: u32 = 18;
const POOL_SIZE_SHIFT: u32 = 2;
const POOL_SIZE_BITS: u32 = 24;
const VERSION_SHIFT: u32 = 0;
const VERSION_BITS: u32 = 2;

/// Wire variant of the table of contents. Range: 0-3.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TableOfContentsVersion {
    /// 20 byte file entries with u32 decompressed sizes.
    #[default]
    V0 = 0,
    /// 24 byte file entries with u64 decompressed sizes.
    V1 = 1,
}

impl TableOfContentsVersion {
    /// Bytes taken by one serialized [`FileEntry`](crate::headers::FileEntry).
    pub fn entry_size(self) -> usize {
        match self {
            Self::V0 => FILE_ENTRY_SIZE_V0,
            Self::V1 => FILE_ENTRY_SIZE_V1,
        }
    }

    /// Picks V1 only when some file does not fit a 32-bit size.
    pub fn for_largest_file(largest_file_size: u64) -> Self {
        if largest_file_size > u32::MAX as u64 {
            Self::V1
        } else {
            Self::V0
        }
    }
}

impl TryFrom<u8> for TableOfContentsVersion {
    type Error = NxError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            other => Err(NxError::UnsupportedTocVersion(other)),
        }
    }
}

/// The 8-byte word opening the table of contents:
/// `fileCount:20 | blockCount:18 | stringPoolSize:24 | version:2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeTocHeader {
    packed: u64,
}

impl NativeTocHeader {
    /// Packs the four ToC header fields.
    ///
    /// # Arguments
    /// * `file_count` - Number of file entries (20 bits)
    /// * `block_count` - Number of block entries (18 bits)
    /// * `string_pool_size` - Compressed string pool length in bytes (24 bits)
    /// * `version` - Entry layout used by the table
    pub fn new(
        file_count: u32,
        block_count: u32,
        string_pool_size: u32,
        version: TableOfContentsVersion,
    ) -> Self {
        let mut header = Self::default();
        header.set_file_count(file_count);
        header.set_block_count(block_count);
        header.set_string_pool_size(string_pool_size);
        header.set_version_raw(version as u8);
        header
    }

    /// Wraps an already packed word without validation.
    pub fn from_raw(packed: u64) -> Self {
        Self { packed }
    }

    pub fn raw(&self) -> u64 {
        self.packed
    }

    /// Number of file entries in the table.
    pub fn file_count(&self) -> u32 {
        extract(self.packed, FILE_COUNT_SHIFT, FILE_COUNT_BITS) as u32
    }

    /// Sets the file count, truncated to 20 bits.
    pub fn set_file_count(&mut self, value: u32) {
        self.packed = insert(self.packed, FILE_COUNT_SHIFT, FILE_COUNT_BITS, value as u64);
    }

    /// Number of block entries in the table.
    pub fn block_count(&self) -> u32 {
        extract(self.packed, BLOCK_COUNT_SHIFT, BLOCK_COUNT_BITS) as u32
    }

    /// Sets the block count, truncated to 18 bits.
    pub fn set_block_count(&mut self, value: u32) {
        self.packed = insert(self.packed, BLOCK_COUNT_SHIFT, BLOCK_COUNT_BITS, value as u64);
    }

    /// Compressed length of the string pool that follows the block entries.
    pub fn string_pool_size(&self) -> u32 {
        extract(self.packed, POOL_SIZE_SHIFT, POOL_SIZE_BITS) as u32
    }

    /// Sets the pool size, truncated to 24 bits.
    pub fn set_string_pool_size(&mut self, value: u32) {
        self.packed = insert(self.packed, POOL_SIZE_SHIFT, POOL_SIZE_BITS, value as u64);
    }

    /// Version bits as stored, including values no [`TableOfContentsVersion`] names.
    pub fn version_raw(&self) -> u8 {
        extract(self.packed, VERSION_SHIFT, VERSION_BITS) as u8
    }

    /// Sets the version bits directly, truncated to 2 bits.
    pub fn set_version_raw(&mut self, value: u8) {
        self.packed = insert(self.packed, VERSION_SHIFT, VERSION_BITS, value as u64);
    }

    /// Decoded entry layout.
    ///
    /// # Errors
    /// [`NxError::UnsupportedTocVersion`] for raw versions 2 and 3.
    pub fn version(&self) -> Result<TableOfContentsVersion> {
        TableOfContentsVersion::try_from(self.version_raw())
    }

    /// Little-endian encoding of the packed word.
    pub fn to_bytes(&self) -> [u8; TOC_HEADER_SIZE] {
        self.packed.to_le_bytes()
    }

    /// Reads the packed word from the first 8 bytes of `bytes`.
    ///
    /// # Arguments
    /// * `bytes` - At least [`TOC_HEADER_SIZE`] bytes starting at the ToC
    ///
    /// # Errors
    /// [`NxError::InvalidFormat`] if fewer than 8 bytes are given. The version
    /// is checked later by [`Self::version`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < TOC_HEADER_SIZE {
            return Err(NxError::InvalidFormat("table of contents header is truncated"));
        }

        let mut raw = [0u8; TOC_HEADER_SIZE];
        raw.copy_from_slice(&bytes[..TOC_HEADER_SIZE]);
        Ok(Self::from_raw(u64::from_le_bytes(raw)))
    }
}
