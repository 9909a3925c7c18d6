use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use memmap2::MmapMut;

use crate::core::lock_unpoisoned;
use crate::hashing::hash_bytes;
use crate::headers::FileEntry;
use crate::types::Result;
use crate::NxError;

/// Largest file an [`OutputArrayProvider`] accepts.
pub const MAX_ARRAY_OUTPUT_SIZE: u64 = i32::MAX as u64;

/// Destination for one extracted file.
///
/// `write_at` may be called from several threads for different ranges of
/// the same file (one per chunk).
pub trait OutputDataProvider: Send + Sync + fmt::Debug {
    fn relative_path(&self) -> &str;

    fn entry(&self) -> &FileEntry;

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// XXH64 of everything written so far; used to verify extraction.
    fn hash_contents(&self) -> Result<u64>;

    /// Flushes buffered data once every range has been written.
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

fn checked_range(offset: u64, len: usize, size: u64) -> Result<(usize, usize)> {
    let end = offset
        .checked_add(len as u64)
        .filter(|end| *end <= size)
        .ok_or(NxError::InvalidFormat("write past end of output file"))?;
    Ok((offset as usize, end as usize))
}

/// Collects an extracted file in memory.
pub struct OutputArrayProvider {
    relative_path: String,
    entry: FileEntry,
    data: Mutex<Vec<u8>>,
}

impl OutputArrayProvider {
    /// # Errors
    /// [`NxError::FileTooLargeForArray`] for files over 2 GiB - 1.
    pub fn new(relative_path: impl Into<String>, entry: FileEntry) -> Result<Self> {
        if entry.decompressed_size > MAX_ARRAY_OUTPUT_SIZE {
            return Err(NxError::FileTooLargeForArray {
                size: entry.decompressed_size,
                max: MAX_ARRAY_OUTPUT_SIZE,
            });
        }
        Ok(Self {
            relative_path: relative_path.into(),
            entry,
            data: Mutex::new(vec![0; entry.decompressed_size as usize]),
        })
    }

    /// Takes the extracted bytes.
    pub fn into_data(self) -> Vec<u8> {
        match self.data.into_inner() {
            Ok(data) => data,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        lock_unpoisoned(&self.data).clone()
    }
}

impl fmt::Debug for OutputArrayProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputArrayProvider")
            .field("relative_path", &self.relative_path)
            .field("size", &self.entry.decompressed_size)
            .finish()
    }
}

impl OutputDataProvider for OutputArrayProvider {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn entry(&self) -> &FileEntry {
        &self.entry
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let (start, end) = checked_range(offset, data.len(), self.entry.decompressed_size)?;
        lock_unpoisoned(&self.data)[start..end].copy_from_slice(data);
        Ok(())
    }

    fn hash_contents(&self) -> Result<u64> {
        Ok(hash_bytes(&lock_unpoisoned(&self.data)))
    }
}

/// Writes an extracted file to disk through a writable memory map.
pub struct OutputFileProvider {
    relative_path: String,
    entry: FileEntry,
    full_path: PathBuf,
    map: Option<Mutex<MmapMut>>,
}

impl OutputFileProvider {
    /// Creates `root/relative_path` (and its parent directories) at its
    /// final size. Paths that would leave `root` are rejected.
    pub fn new(root: &Path, relative_path: impl Into<String>, entry: FileEntry) -> Result<Self> {
        let relative_path = relative_path.into();
        let full_path = resolve_under(root, &relative_path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .map_err(|err| {
                NxError::from(err).with_context(format!("create {}", full_path.display()))
            })?;
        file.set_len(entry.decompressed_size)?;

        // SAFETY: the file was just created by us and is only written through this map.
        let map = if entry.decompressed_size == 0 {
            None
        } else {
            Some(Mutex::new(unsafe { MmapMut::map_mut(&file)? }))
        };

        Ok(Self {
            relative_path,
            entry,
            full_path,
            map,
        })
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }
}

impl fmt::Debug for OutputFileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputFileProvider")
            .field("relative_path", &self.relative_path)
            .field("full_path", &self.full_path)
            .field("size", &self.entry.decompressed_size)
            .finish()
    }
}

impl OutputDataProvider for OutputFileProvider {
    fn relative_path(&self) -> &str {
        &self.relative_path
    }

    fn entry(&self) -> &FileEntry {
        &self.entry
    }

    fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let (start, end) = checked_range(offset, data.len(), self.entry.decompressed_size)?;
        if start == end {
            return Ok(());
        }
        let map = self
            .map
            .as_ref()
            .ok_or(NxError::InvalidFormat("write into empty output file"))?;
        lock_unpoisoned(map)[start..end].copy_from_slice(data);
        Ok(())
    }

    fn hash_contents(&self) -> Result<u64> {
        Ok(match &self.map {
            Some(map) => hash_bytes(&lock_unpoisoned(map)),
            None => hash_bytes(&[]),
        })
    }

    fn finish(&self) -> Result<()> {
        if let Some(map) = &self.map {
            lock_unpoisoned(map).flush()?;
        }
        Ok(())
    }
}

fn resolve_under(root: &Path, relative_path: &str) -> Result<PathBuf> {
    let mut full_path = root.to_path_buf();
    for component in Path::new(relative_path).components() {
        match component {
            Component::Normal(part) => full_path.push(part),
            Component::CurDir => {}
            _ => {
                return Err(NxError::InvalidFormat(
                    "archive path escapes the output directory",
                ));
            }
        }
    }
    Ok(full_path)
}
