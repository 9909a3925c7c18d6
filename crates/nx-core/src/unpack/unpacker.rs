use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::core::{CancellationToken, WorkerPool};
use crate::headers::{FileEntry, ParsedHeader};
use crate::io::{FileDataProvider, OutputArrayProvider, OutputDataProvider, OutputFileProvider};
use crate::telemetry::{self, tags};
use crate::unpack::extractable::{ExtractableBlock, plan_extraction};
use crate::unpack::listing::ArchiveListing;
use crate::unpack::settings::UnpackerSettings;
use crate::unpack::source::NxSource;
use crate::{NxError, Result};

/// A file extracted into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub relative_path: String,
    pub entry: FileEntry,
    pub data: Vec<u8>,
}

/// Reads files out of an archive.
#[derive(Debug, Clone)]
pub struct NxUnpacker {
    source: Arc<NxSource>,
}

impl NxUnpacker {
    /// Opens an archive served by `provider`.
    ///
    /// # Arguments
    /// * `provider` - Byte source for the whole archive
    pub fn open(provider: Arc<dyn FileDataProvider>) -> Result<Self> {
        Ok(Self {
            source: Arc::new(NxSource::open(provider)?),
        })
    }

    /// Opens the archive file at `path`; errors name the path.
    pub fn open_path(path: &Path) -> Result<Self> {
        let source = NxSource::open_path(path)
            .map_err(|err| err.with_context(format!("open archive {}", path.display())))?;
        Ok(Self {
            source: Arc::new(source),
        })
    }

    /// Wraps a source that is already open, sharing it with other users.
    pub fn from_source(source: Arc<NxSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<NxSource> {
        &self.source
    }

    pub fn header(&self) -> &ParsedHeader {
        self.source.header()
    }

    /// File entries in ToC order.
    pub fn file_entries(&self) -> &[FileEntry] {
        &self.source.header().entries
    }

    /// Relative path of `entry`, or `None` if its path index is out of range.
    pub fn file_path(&self, entry: &FileEntry) -> Option<&str> {
        self.source.header().path_of(entry)
    }

    /// First entry stored under `path`.
    pub fn find_entry(&self, path: &str) -> Option<FileEntry> {
        self.file_entries()
            .iter()
            .find(|entry| self.file_path(entry) == Some(path))
            .copied()
    }

    /// Summary of the archive with files sorted by path.
    pub fn listing(&self) -> ArchiveListing {
        ArchiveListing::from_source(&self.source)
    }

    fn path_for(&self, entry: &FileEntry) -> Result<String> {
        self.file_path(entry)
            .map(str::to_owned)
            .ok_or(NxError::InvalidFormat("file entry path index out of range"))
    }

    /// Extracts `entries` into memory.
    ///
    /// # Errors
    /// [`NxError::FileTooLargeForArray`] if an entry is over 2 GiB - 1.
    pub fn extract_in_memory(
        &self,
        entries: &[FileEntry],
        settings: UnpackerSettings,
    ) -> Result<Vec<ExtractedFile>> {
        let arrays = entries
            .iter()
            .map(|entry| Ok(Arc::new(OutputArrayProvider::new(self.path_for(entry)?, *entry)?)))
            .collect::<Result<Vec<_>>>()?;
        let outputs: Vec<Arc<dyn OutputDataProvider>> = arrays
            .iter()
            .map(|array| Arc::clone(array) as Arc<dyn OutputDataProvider>)
            .collect();
        self.extract(outputs, settings)?;

        Ok(arrays
            .into_iter()
            .map(|array| {
                let relative_path = array.relative_path().to_owned();
                let entry = *array.entry();
                let data = match Arc::try_unwrap(array) {
                    Ok(array) => array.into_data(),
                    Err(shared) => shared.to_vec(),
                };
                ExtractedFile {
                    relative_path,
                    entry,
                    data,
                }
            })
            .collect())
    }

    /// Extracts `entries` below `directory`, returning the written paths.
    pub fn extract_to_directory(
        &self,
        entries: &[FileEntry],
        directory: &Path,
        settings: UnpackerSettings,
    ) -> Result<Vec<PathBuf>> {
        let named = entries
            .iter()
            .map(|entry| Ok((self.path_for(entry)?, *entry)))
            .collect::<Result<Vec<_>>>()?;
        let files = named
            .into_par_iter()
            .map(|(relative_path, entry)| OutputFileProvider::new(directory, relative_path, entry).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let paths = files.iter().map(|file| file.full_path().to_path_buf()).collect();
        let outputs = files
            .into_iter()
            .map(|file| file as Arc<dyn OutputDataProvider>)
            .collect();
        self.extract(outputs, settings)?;
        Ok(paths)
    }

    /// Extracts into arbitrary outputs, decompressing each needed block once.
    pub fn extract(
        &self,
        outputs: Vec<Arc<dyn OutputDataProvider>>,
        mut settings: UnpackerSettings,
    ) -> Result<()> {
        settings.sanitize();
        let started_at = Instant::now();
        let outputs = Arc::new(outputs);
        let plan = plan_extraction(&outputs, self.source.header().chunk_size());
        let cancellation = settings
            .cancellation
            .as_ref()
            .map(CancellationToken::child)
            .unwrap_or_default();

        tracing::info!(
            target: tags::TARGET_UNPACK,
            files = outputs.len(),
            blocks = plan.len(),
            threads = settings.max_threads,
            "extraction started"
        );

        let pool = WorkerPool::new(settings.max_threads.min(plan.len()).max(1))
            .with_cancellation(cancellation.clone());
        let source = Arc::clone(&self.source);
        let worker_outputs = Arc::clone(&outputs);
        let handle = pool.spawn(move |_worker_id, block: ExtractableBlock| {
            extract_block(&source, &worker_outputs, &block)
        });
        for block in plan {
            if let Err(error) = handle.submit(block) {
                cancellation.cancel();
                let _ = handle.finish();
                return Err(error);
            }
        }
        handle.finish()?;

        for output in outputs.iter() {
            output.finish()?;
            if settings.verify_hashes {
                let actual = output.hash_contents()?;
                if actual != output.entry().hash {
                    tracing::error!(
                        target: tags::TARGET_UNPACK,
                        path = output.relative_path(),
                        expected = output.entry().hash,
                        actual,
                        "hash mismatch"
                    );
                    return Err(NxError::InvalidFormat("extracted file hash mismatch")
                        .with_context(output.relative_path().to_owned()));
                }
            }
        }

        tracing::info!(
            target: tags::TARGET_UNPACK,
            files = outputs.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "extraction finished"
        );
        Ok(())
    }
}

fn extract_block(
    source: &NxSource,
    outputs: &[Arc<dyn OutputDataProvider>],
    block: &ExtractableBlock,
) -> Result<()> {
    let len = usize::try_from(block.decompressed_len)
        .map_err(|_| NxError::InvalidFormat("block larger than address space"))?;
    let data = source.decompress_block(block.block_index, len)?;
    telemetry::increment_counter(tags::METRIC_BLOCK_EXTRACT_COUNT, 1);
    tracing::debug!(
        target: tags::TARGET_BLOCK,
        block_index = block.block_index,
        decompressed_len = len,
        targets = block.targets.len(),
        "block extracted"
    );

    for target in &block.targets {
        let start = target.block_offset as usize;
        let end = start + target.len as usize;
        outputs[target.output_index].write_at(target.file_offset, &data[start..end])?;
    }
    Ok(())
}
