use std::io::{Seek, SeekFrom, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::buffer::PackerBuffers;
use crate::core::{CancellationToken, TurnGate, lock_unpoisoned};
use crate::headers::align_to_page;
use crate::pack::dedup::{ChunkedDeduplicationState, SolidDeduplicationState};
use crate::pack::settings::{PackerSettings, ProgressSnapshot};
use crate::pack::toc_builder::TableOfContentsBuilder;
use crate::telemetry::{self, tags};
use crate::types::CompressionPreference;
use crate::Result;

const ZERO_PAGE: [u8; 4096] = [0; 4096];

/// Sequential writer for the block region of an archive.
#[derive(Debug)]
pub struct BlockWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write + Seek> BlockWriter<W> {
    /// Positions `inner` at `start`, the first byte after the header pages.
    pub fn new(mut inner: W, start: u64) -> Result<Self> {
        inner.seek(SeekFrom::Start(start))?;
        Ok(Self {
            inner,
            position: start,
        })
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Writes `data` and zero padding up to the next page boundary.
    pub fn write_aligned(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        self.position += data.len() as u64;

        let mut padding = (align_to_page(self.position) - self.position) as usize;
        while padding > 0 {
            let step = padding.min(ZERO_PAGE.len());
            self.inner.write_all(&ZERO_PAGE[..step])?;
            padding -= step;
        }
        self.position = align_to_page(self.position);
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    blocks_done: AtomicU32,
    bytes_written: AtomicU64,
}

/// State shared by every block of one packing session.
pub struct PackingContext<W> {
    pub settings: PackerSettings,
    pub toc: TableOfContentsBuilder,
    pub writer: Mutex<BlockWriter<W>>,
    pub buffers: PackerBuffers,
    pub solid_dedup: Option<SolidDeduplicationState>,
    pub chunked_dedup: Option<ChunkedDeduplicationState>,
    pub cancellation: CancellationToken,
    pub(crate) progress: ProgressTracker,
    dedup_turn: TurnGate,
}

impl<W: Write + Seek> PackingContext<W> {
    /// Builds the shared state for one packing session.
    ///
    /// Deduplication maps exist only when enabled in `settings`.
    ///
    /// # Arguments
    /// * `settings` - Sanitized session settings
    /// * `toc` - Table being filled as blocks complete
    /// * `writer` - Output positioned after the reserved header pages
    /// * `cancellation` - Session token, shared with the worker pool
    pub fn new(
        settings: PackerSettings,
        toc: TableOfContentsBuilder,
        writer: BlockWriter<W>,
        cancellation: CancellationToken,
    ) -> Self {
        let solid_dedup = settings
            .enable_solid_deduplication
            .then(SolidDeduplicationState::new);
        let chunked_dedup = settings
            .enable_chunked_deduplication
            .then(ChunkedDeduplicationState::new);
        let buffers = PackerBuffers::new(settings.max_threads);
        let dedup_turn = TurnGate::new(cancellation.clone());
        Self {
            settings,
            toc,
            writer: Mutex::new(writer),
            buffers,
            solid_dedup,
            chunked_dedup,
            cancellation,
            progress: ProgressTracker::default(),
            dedup_turn,
        }
    }

    /// Runs `lookup` during block `block_index`'s deduplication turn.
    ///
    /// Turns are taken in block order, so every lookup sees exactly the
    /// registrations of earlier blocks and the archive does not depend on
    /// thread timing. Without deduplication `lookup` runs immediately.
    ///
    /// # Arguments
    /// * `block_index` - Ticket of the calling block
    /// * `lookup` - Map queries and inserts; keep it free of I/O
    pub fn with_dedup_turn<T>(&self, block_index: u32, lookup: impl FnOnce() -> T) -> Result<T> {
        if self.solid_dedup.is_none() && self.chunked_dedup.is_none() {
            return Ok(lookup());
        }
        self.dedup_turn.wait_for_turn(block_index)?;
        let result = lookup();
        self.dedup_turn.advance();
        Ok(result)
    }

    /// Blocks until `block_index` holds the output turn.
    pub fn enter_turn(&self, block_index: u32) -> Result<BlockTurn<'_, W>> {
        self.toc.wait_for_block_turn(block_index)?;
        Ok(BlockTurn {
            context: self,
            block_index,
            written: false,
            completed: false,
        })
    }

    /// Releases the table and writer once every block is done.
    pub fn into_parts(self) -> (TableOfContentsBuilder, BlockWriter<W>) {
        let writer = match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        (self.toc, writer)
    }
}

/// Exclusive right to append to the archive, held by one block at a time.
///
/// Dropping a turn without [`complete`](Self::complete) means the block
/// failed; every other waiting block is cancelled.
pub struct BlockTurn<'a, W> {
    context: &'a PackingContext<W>,
    block_index: u32,
    written: bool,
    completed: bool,
}

impl<W: Write + Seek> BlockTurn<'_, W> {
    pub fn block_index(&self) -> u32 {
        self.block_index
    }

    pub fn toc(&self) -> &TableOfContentsBuilder {
        &self.context.toc
    }

    /// Appends the block's compressed bytes and records its ToC slot.
    pub fn write_block(&mut self, data: &[u8], compression: CompressionPreference) -> Result<()> {
        let compression = if data.is_empty() {
            CompressionPreference::Copy
        } else {
            compression
        };
        lock_unpoisoned(&self.context.writer).write_aligned(data)?;
        self.context
            .toc
            .set_block(self.block_index, data.len() as u64, compression)?;
        self.written = true;

        telemetry::increment_counter(tags::METRIC_BLOCK_WRITE_COUNT, 1);
        telemetry::increment_counter(tags::METRIC_BLOCK_WRITE_BYTES, data.len() as u64);
        tracing::debug!(
            target: tags::TARGET_BLOCK,
            block_index = self.block_index,
            compressed_size = data.len(),
            compression = compression.name(),
            "block written"
        );
        self.context
            .progress
            .bytes_written
            .fetch_add(align_to_page(data.len() as u64), Ordering::AcqRel);
        Ok(())
    }

    /// Hands the turn to the next block and reports progress.
    pub fn complete(mut self) -> Result<()> {
        if !self.written {
            self.write_block(&[], CompressionPreference::Copy)?;
        }
        self.completed = true;
        self.context.toc.get_and_increment_block_index_atomic();

        let blocks_done = self.context.progress.blocks_done.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(reporter) = &self.context.settings.progress {
            reporter(ProgressSnapshot {
                blocks_done,
                blocks_total: self.context.toc.block_count() as u32,
                bytes_written: self.context.progress.bytes_written.load(Ordering::Acquire),
            });
        }
        Ok(())
    }
}

impl<W> Drop for BlockTurn<'_, W> {
    fn drop(&mut self) {
        if !self.completed {
            self.context.cancellation.cancel();
            self.context.dedup_turn.cancel();
            self.context.toc.cancel();
        }
    }
}
