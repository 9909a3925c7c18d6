use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Seek, Write};
use std::sync::Arc;

use crate::headers::FileEntry;
use crate::pack::blocks::{
    Block, CarriedEntry, ChunkedFileFromExistingArchive, SolidBlockFromExistingArchive,
};
use crate::pack::file::PackerFile;
use crate::pack::grouping::{BlockOptions, group_files, make_blocks};
use crate::pack::lazy_block::{FromLazyBlockProvider, LazyDecompressedBlock};
use crate::pack::packer::write_archive;
use crate::pack::settings::PackerSettings;
use crate::telemetry::tags;
use crate::unpack::NxSource;
use crate::{NxError, Result};

/// Builds a new archive from files of existing archives plus new files,
/// copying compressed blocks verbatim wherever possible.
#[derive(Debug)]
pub struct NxRepackerBuilder {
    settings: PackerSettings,
    files: Vec<PackerFile>,
    archive_blocks: Vec<Block>,
    chunk_size: Option<u32>,
    largest_source_block_size: u32,
}

impl NxRepackerBuilder {
    /// Starts an empty repack session.
    pub fn new(settings: PackerSettings) -> Self {
        Self {
            settings,
            files: Vec::new(),
            archive_blocks: Vec::new(),
            chunk_size: None,
            largest_source_block_size: 0,
        }
    }

    /// Adds a new file to be compressed normally.
    pub fn add_file(&mut self, file: PackerFile) -> &mut Self {
        self.files.push(file);
        self
    }

    /// Adds several new files; see [`Self::add_file`].
    pub fn add_files(&mut self, files: impl IntoIterator<Item = PackerFile>) -> &mut Self {
        self.files.extend(files);
        self
    }

    /// Carries `entries` of `source` into the new archive.
    ///
    /// Chunked files are copied chunk by chunk. A SOLID block whose stored
    /// files are all requested is copied whole; otherwise the block is
    /// decompressed once, on demand, and the requested files are packed
    /// again from it.
    ///
    /// # Errors
    /// [`NxError::ChunkSizeMismatch`] when `source` uses a different chunk
    /// size than an archive added earlier.
    pub fn add_files_from_archive(
        &mut self,
        source: Arc<NxSource>,
        entries: &[FileEntry],
    ) -> Result<&mut Self> {
        let header = source.header();
        let chunk_size = header.chunk_size();
        match self.chunk_size {
            Some(expected) if expected != chunk_size => {
                return Err(NxError::ChunkSizeMismatch {
                    expected,
                    actual: chunk_size,
                });
            }
            Some(_) => {}
            None => self.chunk_size = Some(chunk_size),
        }
        self.largest_source_block_size = self.largest_source_block_size.max(header.block_size());

        let mut stored_per_block: HashMap<u32, HashSet<FileEntry>> = HashMap::new();
        for entry in header.entries.iter().filter(|entry| !entry.is_chunked(chunk_size)) {
            stored_per_block
                .entry(entry.first_block_index)
                .or_default()
                .insert(*entry);
        }

        let mut requested: BTreeMap<u32, Vec<CarriedEntry>> = BTreeMap::new();
        for entry in entries {
            let relative_path = header
                .path_of(entry)
                .ok_or(NxError::InvalidFormat("file entry path index out of range"))?
                .to_owned();
            let carried = CarriedEntry {
                entry: *entry,
                relative_path,
            };

            let num_chunks = entry.chunk_count(chunk_size);
            if num_chunks > 1 {
                let carried = Arc::new(carried);
                for chunk_index in 0..num_chunks {
                    self.archive_blocks.push(Block::ChunkedFromArchive(
                        ChunkedFileFromExistingArchive::new(
                            Arc::clone(&source),
                            Arc::clone(&carried),
                            chunk_index,
                            num_chunks,
                        )?,
                    ));
                }
            } else {
                requested
                    .entry(entry.first_block_index)
                    .or_default()
                    .push(carried);
            }
        }

        for (block_index, carried) in requested {
            let wanted: HashSet<FileEntry> = carried.iter().map(|item| item.entry).collect();
            let whole_block = stored_per_block
                .get(&block_index)
                .is_some_and(|stored| stored.is_subset(&wanted));

            if whole_block {
                tracing::debug!(
                    target: tags::TARGET_REPACK,
                    block_index,
                    files = carried.len(),
                    "copying source block verbatim"
                );
                self.archive_blocks.push(Block::SolidFromArchive(
                    SolidBlockFromExistingArchive::new(Arc::clone(&source), block_index, carried)?,
                ));
                continue;
            }

            let decompressed_len = carried
                .iter()
                .map(|item| item.entry.decompressed_block_offset as u64 + item.entry.decompressed_size)
                .max()
                .unwrap_or(0);
            tracing::debug!(
                target: tags::TARGET_REPACK,
                block_index,
                files = carried.len(),
                decompressed_len,
                "reusing part of source block"
            );
            let lazy = Arc::new(LazyDecompressedBlock::new(
                Arc::clone(&source),
                block_index,
                decompressed_len as usize,
            ));
            for item in carried {
                let provider = FromLazyBlockProvider::new(
                    Arc::clone(&lazy),
                    item.entry.decompressed_block_offset as u64,
                    item.entry.decompressed_size,
                );
                self.files
                    .push(PackerFile::from_provider(item.relative_path, Arc::new(provider)));
            }
        }
        Ok(self)
    }

    /// Writes the new archive to `output`.
    pub fn build<W>(self, output: W) -> Result<W>
    where
        W: Write + Seek + Send + 'static,
    {
        let mut settings = self.settings;
        settings.sanitize();
        if let Some(chunk_size) = self.chunk_size {
            settings.chunk_size = chunk_size;
            if settings.block_size >= chunk_size {
                settings.block_size = chunk_size - 1;
            }
        }
        let header_block_size = settings.block_size.max(self.largest_source_block_size);

        let mut paths: Vec<String> = Vec::new();
        let mut largest_file_size = 0u64;
        for block in &self.archive_blocks {
            match block {
                Block::SolidFromArchive(block) => {
                    for carried in block.entries() {
                        paths.push(carried.relative_path.clone());
                        largest_file_size = largest_file_size.max(carried.entry.decompressed_size);
                    }
                }
                Block::ChunkedFromArchive(block) if block.chunk_index() == 0 => {
                    paths.push(block.carried().relative_path.clone());
                    largest_file_size =
                        largest_file_size.max(block.carried().entry.decompressed_size);
                }
                _ => {}
            }
        }
        for file in &self.files {
            paths.push(file.relative_path().to_owned());
            largest_file_size = largest_file_size.max(file.size());
        }

        tracing::info!(
            target: tags::TARGET_REPACK,
            copied_blocks = self.archive_blocks.len(),
            new_files = self.files.len(),
            "repacking"
        );

        let options = BlockOptions::from(&settings);
        let mut blocks = self.archive_blocks;
        blocks.extend(make_blocks(group_files(self.files), &options));
        write_archive(
            blocks,
            &paths,
            largest_file_size,
            settings,
            header_block_size,
            output,
        )
    }
}
