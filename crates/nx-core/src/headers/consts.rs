/// Magic number at the start of every archive ("NXUS" in little-endian).
pub const NX_MAGIC: u32 = 0x5355_584E;
/// Archive format version written into the file header.
pub const NX_ARCHIVE_VERSION: u8 = 0;

/// Fixed size of the native file header in bytes.
pub const NATIVE_HEADER_SIZE: usize = 8;
/// Fixed size of the table of contents header in bytes.
pub const TOC_HEADER_SIZE: usize = 8;
/// Size of a V0 file entry (32-bit decompressed size).
pub const FILE_ENTRY_SIZE_V0: usize = 20;
/// Size of a V1 file entry (64-bit decompressed size).
pub const FILE_ENTRY_SIZE_V1: usize = 24;
/// Size of a packed block size/compression word.
pub const BLOCK_ENTRY_SIZE: usize = 4;

/// Header pages and compressed blocks are aligned to this many bytes.
pub const PAGE_SIZE: u64 = 4096;
/// Initial read size when parsing an archive header.
pub const HEADER_PREFIX_SIZE: usize = 4096;

/// Block size for code `n` is `(BASE_BLOCK_SIZE << n) - 1`.
pub const BASE_BLOCK_SIZE: u32 = 32_768;
/// Largest block size code whose offsets still fit the 26-bit entry field.
/// Headers carrying a larger code are rejected when parsed.
pub const MAX_BLOCK_SIZE_CODE: u8 = 11;
/// Chunk size for code `n` is `BASE_CHUNK_SIZE << n`.
pub const BASE_CHUNK_SIZE: u32 = 512 * 1024;
/// Largest chunk size code representable in the 3-bit header field.
pub const MAX_CHUNK_SIZE_CODE: u8 = 7;

pub const MIN_BLOCK_SIZE: u32 = BASE_BLOCK_SIZE - 1;
pub const MAX_BLOCK_SIZE: u32 = (BASE_BLOCK_SIZE << MAX_BLOCK_SIZE_CODE) - 1;
pub const MIN_CHUNK_SIZE: u32 = BASE_CHUNK_SIZE;
pub const MAX_CHUNK_SIZE: u32 = BASE_CHUNK_SIZE << MAX_CHUNK_SIZE_CODE;

pub const MAX_TOC_PAGE_COUNT: u32 = (1 << 13) - 1;
pub const MAX_FILE_COUNT: u32 = (1 << 20) - 1;
pub const MAX_BLOCK_COUNT: u32 = (1 << 18) - 1;
pub const MAX_STRING_POOL_SIZE: usize = (1 << 24) - 1;
pub const MAX_DECOMPRESSED_BLOCK_OFFSET: u32 = (1 << 26) - 1;
pub const MAX_BLOCK_COMPRESSED_SIZE: u32 = (1 << 29) - 1;

/// Zstandard level used for the string pool regardless of packer settings.
pub const STRING_POOL_COMPRESSION_LEVEL: i32 = 16;
/// Bytes hashed for the cheap first-pass duplicate check of chunked files.
pub const SHORT_HASH_LENGTH: usize = 4096;

/// Rounds `value` up to the next multiple of [`PAGE_SIZE`].
#[inline]
pub const fn align_to_page(value: u64) -> u64 {
    (value + (PAGE_SIZE - 1)) & !(PAGE_SIZE - 1)
}
