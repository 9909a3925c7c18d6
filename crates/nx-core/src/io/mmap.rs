use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use memmap2::{Mmap, MmapOptions};

use crate::types::{FileData, Result};
use crate::NxError;

/// Read-only memory map of a file.
///
/// Zero-length files are not mapped; every slice of them is empty.
///
/// # Example
/// ```no_run
/// use nx_core::MmapInput;
/// use std::path::Path;
///
/// let input = MmapInput::open(Path::new("archive.nx"))?;
/// let first_page = input.mapped_slice_u64(0, 4096.min(input.len_u64()))?;
/// # Ok::<(), nx_core::NxError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MmapInput {
    mmap: Option<Arc<Mmap>>,
    path: PathBuf,
    len: u64,
}

impl MmapInput {
    /// Maps `path` read-only. Empty files are not mapped.
    ///
    /// # Arguments
    /// * `path` - File to map; errors name it
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| NxError::from(err).with_context(format!("open {}", path.display())))?;
        let len = file.metadata()?.len();

        // SAFETY: the map is read-only; callers must not truncate the file
        // while a pack or unpack operation holds it.
        let mmap = if len == 0 {
            None
        } else {
            Some(Arc::new(unsafe { MmapOptions::new().map(&file)? }))
        };

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len_u64(&self) -> u64 {
        self.len
    }

    pub fn len(&self) -> usize {
        self.len.min(usize::MAX as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero-copy view of `[start, end)` that keeps the map alive.
    pub fn mapped_slice_u64(&self, start: u64, end: u64) -> Result<FileData> {
        let (start, end) = self.validate_range(start, end)?;

        match &self.mmap {
            Some(map) => Ok(FileData::Mapped {
                map: Arc::clone(map),
                start,
                end,
            }),
            None => Ok(FileData::empty()),
        }
    }

    /// Owned copy of `[start, end)`.
    pub fn slice_u64(&self, start: u64, end: u64) -> Result<Bytes> {
        let (start, end) = self.validate_range(start, end)?;

        match &self.mmap {
            Some(mmap) => Ok(Bytes::copy_from_slice(&mmap[start..end])),
            None => Ok(Bytes::new()),
        }
    }

    /// Copies the whole file into an owned buffer.
    pub fn as_bytes(&self) -> Result<Bytes> {
        self.slice_u64(0, self.len)
    }

    fn validate_range(&self, start: u64, end: u64) -> Result<(usize, usize)> {
        if start > end || end > self.len {
            return Err(NxError::InvalidFormat("invalid mmap slice range"));
        }

        let start =
            usize::try_from(start).map_err(|_| NxError::InvalidFormat("range start overflow"))?;
        let end = usize::try_from(end).map_err(|_| NxError::InvalidFormat("range end overflow"))?;

        Ok((start, end))
    }
}
