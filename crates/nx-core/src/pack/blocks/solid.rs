use std::io::{Seek, Write};

use crate::compression;
use crate::hashing::hash_bytes;
use crate::headers::{FileEntry, MAX_DECOMPRESSED_BLOCK_OFFSET};
use crate::pack::context::PackingContext;
use crate::pack::dedup::SolidLocation;
use crate::pack::file::PackerFile;
use crate::telemetry::{self, tags};
use crate::types::CompressionPreference;
use crate::{NxError, Result};

/// Several small files concatenated and compressed as one unit.
#[derive(Debug, Clone)]
pub struct SolidBlock {
    items: Vec<PackerFile>,
    compression: CompressionPreference,
}

struct Placement<'a> {
    file: &'a PackerFile,
    hash: u64,
    location: SolidLocation,
    /// False when the bytes live at an earlier location.
    stored: bool,
}

impl SolidBlock {
    pub fn new(items: Vec<PackerFile>, compression: CompressionPreference) -> Self {
        Self { items, compression }
    }

    pub fn items(&self) -> &[PackerFile] {
        &self.items
    }

    pub fn compression(&self) -> CompressionPreference {
        self.compression
    }

    /// Sum of the item sizes before compression.
    pub fn decompressed_size(&self) -> u64 {
        self.items.iter().map(PackerFile::size).sum()
    }

    pub fn largest_item_size(&self) -> u64 {
        self.items.iter().map(PackerFile::size).max().unwrap_or(0)
    }

    pub(crate) fn process<W: Write + Seek>(
        self,
        context: &PackingContext<W>,
        block_index: u32,
    ) -> Result<()> {
        let mut contents = Vec::with_capacity(self.items.len());
        for file in &self.items {
            context.cancellation.check()?;
            let data = file.read(0, file.size())?;
            if data.len() as u64 != file.size() {
                return Err(NxError::InvalidFormat("file changed size while packing"));
            }
            let hash = hash_bytes(&data);
            contents.push((file, data, hash));
        }

        // Offsets depend on which files turn out to be duplicates, so they
        // are assigned during the ordered deduplication turn.
        let placements = context.with_dedup_turn(block_index, || {
            let mut cursor = 0u32;
            let mut placements = Vec::with_capacity(contents.len());
            for (file, _, hash) in &contents {
                let location = SolidLocation {
                    block_index,
                    decompressed_offset: cursor,
                };
                let existing = match &context.solid_dedup {
                    Some(dedup) if file.size() > 0 => dedup.find_or_insert(*hash, location),
                    _ => None,
                };
                if let Some(existing) = existing {
                    telemetry::increment_counter(tags::METRIC_DEDUP_SOLID_HIT_COUNT, 1);
                    tracing::trace!(
                        target: tags::TARGET_BLOCK,
                        path = file.relative_path(),
                        block_index = existing.block_index,
                        offset = existing.decompressed_offset,
                        "duplicate solid file"
                    );
                }
                placements.push(Placement {
                    file: *file,
                    hash: *hash,
                    location: existing.unwrap_or(location),
                    stored: existing.is_none(),
                });
                if existing.is_none() {
                    cursor = cursor.saturating_add(file.size() as u32);
                }
            }
            placements
        })?;

        let total = usize::try_from(self.decompressed_size())
            .map_err(|_| NxError::InvalidFormat("solid block larger than address space"))?;
        let mut input = context.buffers.input.rent(total)?;
        let mut cursor = 0usize;
        for (placement, (_, data, _)) in placements.iter().zip(&contents) {
            if placement.stored {
                input[cursor..cursor + data.len()].copy_from_slice(data);
                cursor += data.len();
            }
        }
        drop(contents);

        if cursor as u64 > MAX_DECOMPRESSED_BLOCK_OFFSET as u64 + 1 {
            return Err(NxError::CapacityExceeded {
                what: "solid block byte",
                count: cursor as u64,
                max: MAX_DECOMPRESSED_BLOCK_OFFSET as u64 + 1,
            });
        }

        let method = self.compression.or(context.settings.solid_compression);
        let mut output = context
            .buffers
            .output
            .rent(compression::alloc_for_compress_size(method, cursor))?;
        let outcome = if cursor == 0 {
            None
        } else {
            Some(compression::compress(
                method,
                context.settings.level_for(method),
                &input[..cursor],
                &mut output,
            )?)
        };
        drop(input);

        let mut turn = context.enter_turn(block_index)?;
        match outcome {
            Some(outcome) => turn.write_block(&output[..outcome.written], outcome.method)?,
            None => turn.write_block(&[], CompressionPreference::Copy)?,
        }
        for placement in &placements {
            let file_path_index = turn.toc().file_path_index(placement.file.relative_path())?;
            turn.toc().add_entry(FileEntry {
                hash: placement.hash,
                decompressed_size: placement.file.size(),
                decompressed_block_offset: placement.location.decompressed_offset,
                file_path_index,
                first_block_index: placement.location.block_index,
            })?;
        }
        turn.complete()
    }
}
