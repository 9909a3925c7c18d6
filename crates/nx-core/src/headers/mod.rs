pub mod bits;
pub mod consts;
pub mod file_entry;
pub mod native_header;
pub mod parser;
pub mod string_pool;
pub mod toc;
pub mod toc_header;

pub use consts::*;
pub use file_entry::{BlockSize, FileEntry, OffsetPathIndexTuple, pack_block_word, unpack_block_word};
pub use native_header::{
    NativeFileHeader, block_size_code, block_size_for_code, chunk_size_code, chunk_size_for_code,
};
pub use parser::{ParsedHeader, compute_block_offsets, required_header_size};
pub use toc::{TableOfContents, calculate_table_size};
pub use toc_header::{NativeTocHeader, TableOfContentsVersion};
