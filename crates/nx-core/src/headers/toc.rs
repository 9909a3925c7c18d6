use crate::headers::bits::{LittleEndianReader, LittleEndianWriter};
use crate::headers::consts::{
    BLOCK_ENTRY_SIZE, MAX_BLOCK_COUNT, MAX_FILE_COUNT, MAX_STRING_POOL_SIZE, TOC_HEADER_SIZE,
};
use crate::headers::file_entry::{BlockSize, FileEntry, pack_block_word, unpack_block_word};
use crate::headers::string_pool;
use crate::headers::toc_header::{NativeTocHeader, TableOfContentsVersion};
use crate::types::CompressionPreference;
use crate::{NxError, Result};

/// Exact serialized size of a table of contents.
pub fn calculate_table_size(
    entry_count: usize,
    block_count: usize,
    pool_size: usize,
    version: TableOfContentsVersion,
) -> usize {
    TOC_HEADER_SIZE + entry_count * version.entry_size() + block_count * BLOCK_ENTRY_SIZE + pool_size
}

/// Archive metadata: file entries, block sizes and their compression, and
/// the decompressed string pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOfContents {
    pub block_compressions: Vec<CompressionPreference>,
    pub blocks: Vec<BlockSize>,
    pub entries: Vec<FileEntry>,
    pub pool: Vec<String>,
    /// Compressed size of the string pool as stored on the wire.
    pub pool_size: u32,
    pub version: TableOfContentsVersion,
}

impl TableOfContents {
    /// Path of `entry`, when its path index is inside the pool.
    pub fn path_of(&self, entry: &FileEntry) -> Option<&str> {
        self.pool.get(entry.file_path_index as usize).map(String::as_str)
    }

    /// Bytes this table takes when written, before page padding.
    pub fn serialized_size(&self) -> usize {
        calculate_table_size(
            self.entries.len(),
            self.blocks.len(),
            self.pool_size as usize,
            self.version,
        )
    }

    /// Serializes the table into `output`, returning the bytes written.
    ///
    /// `output` must hold at least [`calculate_table_size`] bytes.
    pub fn serialize_into(
        output: &mut [u8],
        version: TableOfContentsVersion,
        entries: &[FileEntry],
        blocks: &[BlockSize],
        compressions: &[CompressionPreference],
        compressed_pool: &[u8],
    ) -> Result<usize> {
        if entries.len() > MAX_FILE_COUNT as usize {
            return Err(NxError::CapacityExceeded {
                what: "file",
                count: entries.len() as u64,
                max: MAX_FILE_COUNT as u64,
            });
        }
        if blocks.len() > MAX_BLOCK_COUNT as usize {
            return Err(NxError::CapacityExceeded {
                what: "block",
                count: blocks.len() as u64,
                max: MAX_BLOCK_COUNT as u64,
            });
        }
        if blocks.len() != compressions.len() {
            return Err(NxError::InvalidFormat("block and compression counts differ"));
        }
        if compressed_pool.len() > MAX_STRING_POOL_SIZE {
            return Err(NxError::InsufficientStringPoolSize {
                size: compressed_pool.len(),
                max: MAX_STRING_POOL_SIZE,
            });
        }

        let required =
            calculate_table_size(entries.len(), blocks.len(), compressed_pool.len(), version);
        if output.len() < required {
            return Err(NxError::InvalidFormat("ToC output buffer is too small"));
        }

        let header = NativeTocHeader::new(
            entries.len() as u32,
            blocks.len() as u32,
            compressed_pool.len() as u32,
            version,
        );
        let mut writer = LittleEndianWriter::new(output);
        writer.write_u64(header.raw());

        let write_entry: fn(&FileEntry, &mut LittleEndianWriter<'_>) = match version {
            TableOfContentsVersion::V0 => FileEntry::write_v0,
            TableOfContentsVersion::V1 => FileEntry::write_v1,
        };
        let mut entry_groups = entries.chunks_exact(4);
        for group in &mut entry_groups {
            write_entry(&group[0], &mut writer);
            write_entry(&group[1], &mut writer);
            write_entry(&group[2], &mut writer);
            write_entry(&group[3], &mut writer);
        }
        for entry in entry_groups.remainder() {
            write_entry(entry, &mut writer);
        }

        let mut block_groups = blocks.chunks_exact(4);
        let mut compression_groups = compressions.chunks_exact(4);
        for (group, methods) in (&mut block_groups).zip(&mut compression_groups) {
            writer.write_u32_at_offset(pack_block_word(group[0], methods[0]), 0);
            writer.write_u32_at_offset(pack_block_word(group[1], methods[1]), 4);
            writer.write_u32_at_offset(pack_block_word(group[2], methods[2]), 8);
            writer.write_u32_at_offset(pack_block_word(group[3], methods[3]), 12);
            writer.seek(16);
        }
        for (block, method) in block_groups
            .remainder()
            .iter()
            .zip(compression_groups.remainder())
        {
            writer.write_u32(pack_block_word(*block, *method));
        }

        writer.write_bytes(compressed_pool);
        Ok(writer.position())
    }

    /// Parses a table from `data`, which starts at the ToC header.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let header = NativeTocHeader::from_bytes(data)?;
        let version = header.version()?;
        let entry_count = header.file_count() as usize;
        let block_count = header.block_count() as usize;
        let pool_size = header.string_pool_size() as usize;

        let required = calculate_table_size(entry_count, block_count, pool_size, version);
        if data.len() < required {
            return Err(NxError::InvalidFormat("table of contents is truncated"));
        }

        let mut reader = LittleEndianReader::new(data);
        reader.seek(TOC_HEADER_SIZE);

        let read_entry: fn(&mut LittleEndianReader<'_>) -> FileEntry = match version {
            TableOfContentsVersion::V0 => FileEntry::read_v0,
            TableOfContentsVersion::V1 => FileEntry::read_v1,
        };
        let mut entries = Vec::with_capacity(entry_count);
        let unrolled = entry_count / 4 * 4;
        while entries.len() < unrolled {
            entries.push(read_entry(&mut reader));
            entries.push(read_entry(&mut reader));
            entries.push(read_entry(&mut reader));
            entries.push(read_entry(&mut reader));
        }
        while entries.len() < entry_count {
            entries.push(read_entry(&mut reader));
        }

        let mut blocks = Vec::with_capacity(block_count);
        let mut block_compressions = Vec::with_capacity(block_count);
        let unrolled = block_count / 4 * 4;
        while blocks.len() < unrolled {
            for offset in [0, 4, 8, 12] {
                let (block, compression) = unpack_block_word(reader.read_u32_at_offset(offset))?;
                blocks.push(block);
                block_compressions.push(compression);
            }
            reader.seek(16);
        }
        while blocks.len() < block_count {
            let (block, compression) = unpack_block_word(reader.read_u32())?;
            blocks.push(block);
            block_compressions.push(compression);
        }

        let pool = string_pool::unpack(reader.read_bytes(pool_size), entry_count)?;
        for entry in &entries {
            if entry.file_path_index as usize >= pool.len() {
                return Err(NxError::InvalidFormat("file entry path index is out of range"));
            }
        }

        Ok(Self {
            block_compressions,
            blocks,
            entries,
            pool,
            pool_size: pool_size as u32,
            version,
        })
    }
}
