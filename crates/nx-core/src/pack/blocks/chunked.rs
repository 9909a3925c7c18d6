use std::io::{Seek, Write};
use std::sync::{Arc, Mutex};

use crate::compression;
use crate::core::lock_unpoisoned;
use crate::hashing::{StreamingHasher, short_hash};
use crate::headers::FileEntry;
use crate::pack::context::PackingContext;
use crate::pack::file::PackerFile;
use crate::telemetry::{self, tags};
use crate::types::CompressionPreference;
use crate::{NxError, Result};

/// Earlier file with identical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateTarget {
    pub first_block_index: u32,
    pub hash: u64,
}

#[derive(Debug, Default)]
struct ChunkProgress {
    hasher: StreamingHasher,
    duplicate_of: Option<DuplicateTarget>,
}

/// State shared by all chunks of one file.
///
/// Chunks update it only while holding the output turn, so the running hash
/// always sees the file's bytes in order.
#[derive(Debug)]
pub struct ChunkedBlockState {
    file: PackerFile,
    num_chunks: u32,
    chunk_size: u32,
    compression: CompressionPreference,
    progress: Mutex<ChunkProgress>,
}

impl ChunkedBlockState {
    pub fn new(
        file: PackerFile,
        num_chunks: u32,
        chunk_size: u32,
        compression: CompressionPreference,
    ) -> Self {
        Self {
            file,
            num_chunks,
            chunk_size,
            compression,
            progress: Mutex::new(ChunkProgress::default()),
        }
    }

    pub fn file(&self) -> &PackerFile {
        &self.file
    }

    pub fn num_chunks(&self) -> u32 {
        self.num_chunks
    }

    pub fn compression(&self) -> CompressionPreference {
        self.compression
    }

    pub fn duplicate_of(&self) -> Option<DuplicateTarget> {
        lock_unpoisoned(&self.progress).duplicate_of
    }

    fn mark_duplicate(&self, target: DuplicateTarget) {
        lock_unpoisoned(&self.progress).duplicate_of = Some(target);
    }

    fn update_hash(&self, data: &[u8]) {
        lock_unpoisoned(&self.progress).hasher.update(data);
    }

    fn finish_hash(&self) -> u64 {
        lock_unpoisoned(&self.progress).hasher.digest()
    }

    /// Hashes the whole file, reading it one chunk at a time.
    fn hash_entire_file(&self) -> Result<u64> {
        let mut hasher = StreamingHasher::new();
        let size = self.file.size();
        let mut offset = 0u64;
        while offset < size {
            let len = (size - offset).min(self.chunk_size as u64);
            hasher.update(&self.file.read(offset, len)?);
            offset += len;
        }
        Ok(hasher.digest())
    }
}

/// One slice of a file larger than the SOLID block budget.
#[derive(Debug, Clone)]
pub struct ChunkedFileBlock {
    state: Arc<ChunkedBlockState>,
    start_offset: u64,
    chunk_len: u32,
    chunk_index: u32,
}

impl ChunkedFileBlock {
    pub fn new(
        state: Arc<ChunkedBlockState>,
        start_offset: u64,
        chunk_len: u32,
        chunk_index: u32,
    ) -> Self {
        Self {
            state,
            start_offset,
            chunk_len,
            chunk_index,
        }
    }

    pub fn state(&self) -> &Arc<ChunkedBlockState> {
        &self.state
    }

    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    pub fn chunk_len(&self) -> u32 {
        self.chunk_len
    }

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn is_last_chunk(&self) -> bool {
        self.chunk_index + 1 == self.state.num_chunks
    }

    pub(crate) fn process<W: Write + Seek>(
        self,
        context: &PackingContext<W>,
        block_index: u32,
    ) -> Result<()> {
        context.cancellation.check()?;
        let state = &self.state;
        let data = state.file.read(self.start_offset, self.chunk_len as u64)?;
        if data.len() != self.chunk_len as usize {
            return Err(NxError::InvalidFormat("file changed size while packing"));
        }

        let dedup = context.chunked_dedup.as_ref();
        let short_hash_seen = match dedup {
            Some(dedup) if self.chunk_index == 0 => {
                let short = short_hash(&data);
                context.with_dedup_turn(block_index, || dedup.insert_short_hash(short))?
            }
            _ => context.with_dedup_turn(block_index, || false)?,
        };

        // Only a short-hash collision pays for hashing the whole file, and
        // that happens before taking the output turn.
        let candidate_hash = if short_hash_seen {
            telemetry::increment_counter(tags::METRIC_DEDUP_SHORT_HASH_COLLISION_COUNT, 1);
            Some(state.hash_entire_file()?)
        } else {
            None
        };

        // Later chunks of a known duplicate need no compression at all.
        let method = state.compression.or(context.settings.chunked_compression);
        let mut output = context
            .buffers
            .output
            .rent(compression::alloc_for_compress_size(method, data.len()))?;
        let outcome = if state.duplicate_of().is_some() {
            None
        } else {
            Some(compression::compress(
                method,
                context.settings.level_for(method),
                &data,
                &mut output,
            )?)
        };

        let mut turn = context.enter_turn(block_index)?;

        if let (Some(dedup), Some(full)) = (dedup, candidate_hash) {
            if let Some(first_block_index) = dedup.find_full_hash(full) {
                telemetry::increment_counter(tags::METRIC_DEDUP_CHUNKED_HIT_COUNT, 1);
                tracing::debug!(
                    target: tags::TARGET_BLOCK,
                    path = state.file.relative_path(),
                    first_block_index,
                    "duplicate chunked file"
                );
                state.mark_duplicate(DuplicateTarget {
                    first_block_index,
                    hash: full,
                });
            }
        }

        match (state.duplicate_of(), outcome) {
            (None, Some(outcome)) => {
                state.update_hash(&data);
                turn.write_block(&output[..outcome.written], outcome.method)?;
            }
            (None, None) => {
                return Err(NxError::InvalidFormat("chunk skipped without a duplicate"));
            }
            (Some(_), _) => turn.write_block(&[], CompressionPreference::Copy)?,
        }
        drop(output);

        if self.is_last_chunk() {
            let (hash, first_block_index) = match state.duplicate_of() {
                Some(target) => (target.hash, target.first_block_index),
                None => {
                    let hash = state.finish_hash();
                    let first_block_index = block_index - self.chunk_index;
                    if let Some(dedup) = dedup {
                        dedup.register_full_hash(hash, first_block_index);
                    }
                    (hash, first_block_index)
                }
            };
            let file_path_index = turn.toc().file_path_index(state.file.relative_path())?;
            turn.toc().add_entry(FileEntry {
                hash,
                decompressed_size: state.file.size(),
                decompressed_block_offset: 0,
                file_path_index,
                first_block_index,
            })?;
        }
        turn.complete()
    }
}
