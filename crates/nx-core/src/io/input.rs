use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;

use crate::core::lock_unpoisoned;
use crate::io::mmap::MmapInput;
use crate::types::{FileData, Result};
use crate::NxError;

/// Random-access source of a file's (or archive's) bytes.
pub trait FileDataProvider: Send + Sync + fmt::Debug {
    /// Returns `len` bytes starting at `start`.
    ///
    /// # Errors
    /// Fails when the range reaches past [`len`](Self::len) or the backing
    /// storage cannot be read.
    fn get_file_data(&self, start: u64, len: u64) -> Result<FileData>;

    /// Total number of readable bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_range(start: u64, len: u64, total: u64) -> Result<(usize, usize)> {
    let end = start
        .checked_add(len)
        .ok_or(NxError::InvalidFormat("file data range overflows"))?;
    if end > total {
        return Err(NxError::InvalidFormat("file data range past end of source"));
    }
    let start =
        usize::try_from(start).map_err(|_| NxError::InvalidFormat("range start overflow"))?;
    let end = usize::try_from(end).map_err(|_| NxError::InvalidFormat("range end overflow"))?;
    Ok((start, end))
}

/// Serves bytes already held in memory.
#[derive(Debug, Clone)]
pub struct FromArrayProvider {
    data: Bytes,
}

impl FromArrayProvider {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl FileDataProvider for FromArrayProvider {
    fn get_file_data(&self, start: u64, len: u64) -> Result<FileData> {
        let (start, end) = check_range(start, len, self.data.len() as u64)?;
        Ok(FileData::Owned(self.data.slice(start..end)))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Serves bytes of a file on disk, mapping it each time data is requested.
///
/// Nothing stays open between calls, so thousands of pending files do not
/// hold thousands of descriptors.
#[derive(Debug, Clone)]
pub struct FromFilePathProvider {
    path: PathBuf,
    len: u64,
}

impl FromFilePathProvider {
    /// Reads the file size from metadata.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let len = std::fs::metadata(&path)
            .map_err(|err| NxError::from(err).with_context(format!("stat {}", path.display())))?
            .len();
        Ok(Self { path, len })
    }

    /// Uses a size that is already known, e.g. from directory discovery.
    pub fn with_len(path: impl Into<PathBuf>, len: u64) -> Self {
        Self {
            path: path.into(),
            len,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileDataProvider for FromFilePathProvider {
    fn get_file_data(&self, start: u64, len: u64) -> Result<FileData> {
        check_range(start, len, self.len)?;
        if len == 0 {
            return Ok(FileData::empty());
        }
        let input = MmapInput::open(&self.path)?;
        input.mapped_slice_u64(start, start + len)
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// Serves bytes from a seekable stream, one reader at a time.
pub struct FromStreamProvider<R> {
    stream: Mutex<R>,
    len: u64,
}

impl<R: Read + Seek> FromStreamProvider<R> {
    /// Measures `stream` by seeking to its end, then rewinds it.
    pub fn new(mut stream: R) -> Result<Self> {
        let len = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Self {
            stream: Mutex::new(stream),
            len,
        })
    }

    pub fn into_inner(self) -> R {
        match self.stream.into_inner() {
            Ok(stream) => stream,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<R> fmt::Debug for FromStreamProvider<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromStreamProvider")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl<R: Read + Seek + Send> FileDataProvider for FromStreamProvider<R> {
    fn get_file_data(&self, start: u64, len: u64) -> Result<FileData> {
        let (from, to) = check_range(start, len, self.len)?;
        let mut buffer = vec![0u8; to - from];
        let mut stream = lock_unpoisoned(&self.stream);
        stream.seek(SeekFrom::Start(start))?;
        stream.read_exact(&mut buffer)?;
        Ok(FileData::Owned(Bytes::from(buffer)))
    }

    fn len(&self) -> u64 {
        self.len
    }
}
