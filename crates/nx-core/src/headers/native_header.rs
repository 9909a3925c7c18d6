use std::io::{Read, Write};

use crate::headers::bits::{extract, insert};
use crate::headers::consts::{
    BASE_BLOCK_SIZE, BASE_CHUNK_SIZE, MAX_BLOCK_SIZE_CODE, MAX_CHUNK_SIZE_CODE, NATIVE_HEADER_SIZE,
    NX_ARCHIVE_VERSION, NX_MAGIC, PAGE_SIZE,
};
use crate::{NxError, Result};

const VERSION_SHIFT: u32 = 28;
const VERSION_BITS: u32 = 4;
const BLOCK_SIZE_SHIFT: u32 = 24;
const BLOCK_SIZE_BITS: u32 = 4;
const CHUNK_SIZE_SHIFT: u32 = 21;
const CHUNK_SIZE_BITS: u32 = 3;
const PAGE_COUNT_SHIFT: u32 = 8;
const PAGE_COUNT_BITS: u32 = 13;
const FEATURE_FLAGS_SHIFT: u32 = 0;
const FEATURE_FLAGS_BITS: u32 = 8;

/// The 8-byte header at the start of every archive.
///
/// Layout: magic (u32) followed by one packed u32 holding
/// `version:4 | blockSizeCode:4 | chunkSizeCode:3 | tocPageCount:13 | featureFlags:8`
/// from the most significant bit down. Setters truncate values that do not
/// fit their field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeFileHeader {
    magic: u32,
    packed: u32,
}

impl Default for NativeFileHeader {
    fn default() -> Self {
        Self {
            magic: NX_MAGIC,
            packed: 0,
        }
    }
}

impl NativeFileHeader {
    /// Creates a header for the current archive version.
    ///
    /// # Arguments
    /// * `block_size_code` - Block size code; see [`block_size_for_code`]
    /// * `chunk_size_code` - Chunk size code; see [`chunk_size_for_code`]
    /// * `toc_page_count` - Number of 4096-byte pages holding header and ToC
    pub fn new(block_size_code: u8, chunk_size_code: u8, toc_page_count: u32) -> Self {
        let mut header = Self::default();
        header.set_version(NX_ARCHIVE_VERSION);
        header.set_block_size_code(block_size_code);
        header.set_chunk_size_code(chunk_size_code);
        header.set_toc_page_count(toc_page_count);
        header
    }

    /// Magic number read from the file; always [`NX_MAGIC`] after a successful parse.
    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Archive format version (4 bits).
    pub fn version(&self) -> u8 {
        self.field(VERSION_SHIFT, VERSION_BITS) as u8
    }

    /// Sets the archive format version. Only the low 4 bits are kept.
    pub fn set_version(&mut self, value: u8) {
        self.set_field(VERSION_SHIFT, VERSION_BITS, value as u64);
    }

    /// Raw block size code. Use [`Self::block_size`] for the size in bytes.
    pub fn block_size_code(&self) -> u8 {
        self.field(BLOCK_SIZE_SHIFT, BLOCK_SIZE_BITS) as u8
    }

    /// Sets the raw block size code.
    ///
    /// The field holds 4 bits, but [`Self::from_bytes`] only accepts codes up
    /// to [`MAX_BLOCK_SIZE_CODE`].
    pub fn set_block_size_code(&mut self, value: u8) {
        self.set_field(BLOCK_SIZE_SHIFT, BLOCK_SIZE_BITS, value as u64);
    }

    /// Raw chunk size code. Use [`Self::chunk_size`] for the size in bytes.
    pub fn chunk_size_code(&self) -> u8 {
        self.field(CHUNK_SIZE_SHIFT, CHUNK_SIZE_BITS) as u8
    }

    /// Sets the raw chunk size code. Only the low 3 bits are kept.
    pub fn set_chunk_size_code(&mut self, value: u8) {
        self.set_field(CHUNK_SIZE_SHIFT, CHUNK_SIZE_BITS, value as u64);
    }

    /// Pages of 4096 bytes covering this header and the table of contents.
    pub fn toc_page_count(&self) -> u32 {
        self.field(PAGE_COUNT_SHIFT, PAGE_COUNT_BITS) as u32
    }

    /// Sets the page count. Values over 8191 are truncated to 13 bits.
    pub fn set_toc_page_count(&mut self, value: u32) {
        self.set_field(PAGE_COUNT_SHIFT, PAGE_COUNT_BITS, value as u64);
    }

    /// Reserved feature bits; written as zero.
    pub fn feature_flags(&self) -> u8 {
        self.field(FEATURE_FLAGS_SHIFT, FEATURE_FLAGS_BITS) as u8
    }

    /// Sets the reserved feature bits.
    pub fn set_feature_flags(&mut self, value: u8) {
        self.set_field(FEATURE_FLAGS_SHIFT, FEATURE_FLAGS_BITS, value as u64);
    }

    /// Largest SOLID block size the archive was packed with.
    pub fn block_size(&self) -> u32 {
        block_size_for_code(self.block_size_code())
    }

    /// Size of every chunk of a chunked file, except possibly the last.
    pub fn chunk_size(&self) -> u32 {
        chunk_size_for_code(self.chunk_size_code())
    }

    /// Bytes occupied by header and ToC; block 0 starts here.
    pub fn header_page_bytes(&self) -> u64 {
        self.toc_page_count() as u64 * PAGE_SIZE
    }

    /// Writes the 8 header bytes to `writer`.
    ///
    /// # Arguments
    /// * `writer` - Destination, positioned at the start of the archive
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    /// Reads exactly 8 bytes from `reader` and validates them like [`Self::from_bytes`].
    ///
    /// # Arguments
    /// * `reader` - Source, positioned at the start of the archive
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; NATIVE_HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Little-endian encoding: magic, then the packed word.
    pub fn to_bytes(&self) -> [u8; NATIVE_HEADER_SIZE] {
        let mut bytes = [0u8; NATIVE_HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.packed.to_le_bytes());
        bytes
    }

    /// Parses and validates the header from the first 8 bytes of `bytes`.
    ///
    /// Block size codes 12 to 15 fit the 4-bit field but are rejected: a
    /// block that large would hold offsets past the 26-bit
    /// `decompressedBlockOffset` of a file entry, and the packer never
    /// writes them.
    ///
    /// # Arguments
    /// * `bytes` - At least [`NATIVE_HEADER_SIZE`] bytes; extra bytes are ignored
    ///
    /// # Errors
    /// - [`NxError::NotNexusArchive`] when the magic does not match
    /// - [`NxError::UnsupportedArchiveVersion`] for any version but the current one
    /// - [`NxError::InvalidFormat`] when truncated, with a block size code above
    ///   [`MAX_BLOCK_SIZE_CODE`], or with a zero page count
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NATIVE_HEADER_SIZE {
            return Err(NxError::InvalidFormat("archive header is truncated"));
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != NX_MAGIC {
            return Err(NxError::NotNexusArchive { found: magic });
        }

        let header = Self {
            magic,
            packed: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        };
        if header.version() != NX_ARCHIVE_VERSION {
            return Err(NxError::UnsupportedArchiveVersion(header.version()));
        }
        if header.block_size_code() > MAX_BLOCK_SIZE_CODE {
            return Err(NxError::InvalidFormat("block size code out of range"));
        }
        if header.toc_page_count() == 0 {
            return Err(NxError::InvalidFormat("archive header has no ToC pages"));
        }

        Ok(header)
    }

    fn field(&self, shift: u32, bits: u32) -> u64 {
        extract(self.packed as u64, shift, bits)
    }

    fn set_field(&mut self, shift: u32, bits: u32, value: u64) {
        self.packed = insert(self.packed as u64, shift, bits, value) as u32;
    }
}

/// Block size in bytes for `code`: `32768 << code` minus one.
///
/// Codes above [`MAX_BLOCK_SIZE_CODE`] are clamped.
pub fn block_size_for_code(code: u8) -> u32 {
    (BASE_BLOCK_SIZE << code.min(MAX_BLOCK_SIZE_CODE)) - 1
}

/// Chunk size in bytes for `code`: 512 KiB shifted left by `code`, clamped to
/// [`MAX_CHUNK_SIZE_CODE`].
pub fn chunk_size_for_code(code: u8) -> u32 {
    BASE_CHUNK_SIZE << code.min(MAX_CHUNK_SIZE_CODE)
}

/// Smallest code whose block size is at least `block_size`.
pub fn block_size_code(block_size: u32) -> u8 {
    (0..=MAX_BLOCK_SIZE_CODE)
        .find(|code| block_size_for_code(*code) >= block_size)
        .unwrap_or(MAX_BLOCK_SIZE_CODE)
}

/// Smallest code whose chunk size is at least `chunk_size`.
pub fn chunk_size_code(chunk_size: u32) -> u8 {
    (0..=MAX_CHUNK_SIZE_CODE)
        .find(|code| chunk_size_for_code(*code) >= chunk_size)
        .unwrap_or(MAX_CHUNK_SIZE_CODE)
}
