use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::core::{CancellationToken, WorkerPool};
use crate::headers::{
    MAX_TOC_PAGE_COUNT, NATIVE_HEADER_SIZE, NativeFileHeader, PAGE_SIZE, align_to_page,
    block_size_code, chunk_size_code,
};
use crate::io::discover_files;
use crate::pack::blocks::Block;
use crate::pack::context::{BlockWriter, PackingContext};
use crate::pack::file::PackerFile;
use crate::pack::grouping::{BlockOptions, group_files, make_blocks};
use crate::pack::settings::PackerSettings;
use crate::pack::toc_builder::TableOfContentsBuilder;
use crate::telemetry::tags;
use crate::{NxError, Result};

/// Builds archives from loose files.
#[derive(Debug, Clone, Copy, Default)]
pub struct NxPacker;

impl NxPacker {
    /// Packs `files` into `output` and returns the writer positioned at the
    /// end of the archive.
    pub fn pack<W>(files: Vec<PackerFile>, mut settings: PackerSettings, output: W) -> Result<W>
    where
        W: Write + Seek + Send + 'static,
    {
        settings.sanitize();
        let paths: Vec<String> = files.iter().map(|file| file.relative_path().to_owned()).collect();
        let largest_file_size = files.iter().map(PackerFile::size).max().unwrap_or(0);

        let options = BlockOptions::from(&settings);
        let blocks = make_blocks(group_files(files), &options);
        let header_block_size = settings.block_size;
        write_archive(
            blocks,
            &paths,
            largest_file_size,
            settings,
            header_block_size,
            output,
        )
    }

    /// Packs into a new file at `path`, truncated to the archive length.
    pub fn pack_to_path(
        files: Vec<PackerFile>,
        settings: PackerSettings,
        path: &Path,
    ) -> Result<()> {
        let file = File::create(path)
            .map_err(|err| NxError::from(err).with_context(format!("create {}", path.display())))?;
        let mut file = Self::pack(files, settings, file)?;
        let end = file.stream_position()?;
        file.set_len(end)?;
        file.sync_all()?;
        Ok(())
    }

    /// Packs every regular file below `root`, using `/`-separated paths
    /// relative to it.
    pub fn pack_directory<W>(root: &Path, settings: PackerSettings, output: W) -> Result<W>
    where
        W: Write + Seek + Send + 'static,
    {
        let files = discover_files(root)?
            .into_iter()
            .map(|found| PackerFile::from_path_with_len(found.relative_path, found.full_path, found.size))
            .collect();
        Self::pack(files, settings, output)
    }
}

/// Runs `blocks` through the worker pool and writes the finished archive.
///
/// `settings` must already be sanitized. `header_block_size` is recorded in
/// the header; it may exceed `settings.block_size` when blocks were copied
/// from archives with larger blocks.
pub(crate) fn write_archive<W>(
    blocks: Vec<Block>,
    paths: &[String],
    largest_file_size: u64,
    settings: PackerSettings,
    header_block_size: u32,
    output: W,
) -> Result<W>
where
    W: Write + Seek + Send + 'static,
{
    let started_at = Instant::now();
    let cancellation = settings
        .cancellation
        .as_ref()
        .map(CancellationToken::child)
        .unwrap_or_default();
    let block_count = blocks.len();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let toc = TableOfContentsBuilder::new(
        &path_refs,
        block_count,
        largest_file_size,
        cancellation.clone(),
    )?;

    let header_page_bytes = align_to_page((NATIVE_HEADER_SIZE + toc.calculate_table_size()) as u64);
    let page_count = header_page_bytes / PAGE_SIZE;
    if page_count > MAX_TOC_PAGE_COUNT as u64 {
        return Err(NxError::CapacityExceeded {
            what: "header page",
            count: page_count,
            max: MAX_TOC_PAGE_COUNT as u64,
        });
    }
    let header = NativeFileHeader::new(
        block_size_code(header_block_size),
        chunk_size_code(settings.chunk_size),
        page_count as u32,
    );

    tracing::info!(
        target: tags::TARGET_PACK,
        files = paths.len(),
        blocks = block_count,
        header_page_bytes,
        threads = settings.max_threads,
        "packing started"
    );

    let worker_count = settings.max_threads.min(block_count).max(1);
    let writer = BlockWriter::new(output, header_page_bytes)?;
    let context = Arc::new(PackingContext::new(
        settings,
        toc,
        writer,
        cancellation.clone(),
    ));

    let pool = WorkerPool::new(worker_count).with_cancellation(cancellation.clone());
    let worker_context = Arc::clone(&context);
    let handle = pool.spawn(move |_worker_id, (block_index, block): (u32, Block)| {
        block.process(&worker_context, block_index)
    });
    for (block_index, block) in blocks.into_iter().enumerate() {
        if let Err(error) = handle.submit((block_index as u32, block)) {
            cancellation.cancel();
            let _ = handle.finish();
            return Err(error);
        }
    }
    handle.finish()?;

    let context = Arc::try_unwrap(context)
        .map_err(|_| NxError::InvalidFormat("packing context still shared after workers finished"))?;
    let (toc, writer) = context.into_parts();
    let archive_end = writer.position();
    let mut output = writer.into_inner();

    let mut header_bytes = vec![0u8; header_page_bytes as usize];
    header_bytes[..NATIVE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
    toc.build(&mut header_bytes[NATIVE_HEADER_SIZE..])?;
    output.seek(SeekFrom::Start(0))?;
    output.write_all(&header_bytes)?;
    output.seek(SeekFrom::Start(archive_end))?;
    output.flush()?;

    tracing::info!(
        target: tags::TARGET_PACK,
        files = paths.len(),
        blocks = block_count,
        archive_bytes = archive_end,
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "packing finished"
    );
    Ok(output)
}
