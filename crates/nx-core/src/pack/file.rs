use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;

use crate::io::{FileDataProvider, FromArrayProvider, FromFilePathProvider};
use crate::types::{CompressionPreference, FileData, Result, SolidPreference};

/// One file to be added to an archive.
#[derive(Debug, Clone)]
pub struct PackerFile {
    relative_path: String,
    size: u64,
    provider: Arc<dyn FileDataProvider>,
    solid_preference: SolidPreference,
    compression_preference: CompressionPreference,
}

impl PackerFile {
    /// Creates an input backed by any [`FileDataProvider`].
    ///
    /// # Arguments
    /// * `relative_path` - Path stored in the archive; `\` becomes `/`
    /// * `provider` - Source of the bytes; its length is read once here
    pub fn from_provider(relative_path: impl Into<String>, provider: Arc<dyn FileDataProvider>) -> Self {
        Self {
            relative_path: normalize_path(relative_path.into()),
            size: provider.len(),
            provider,
            solid_preference: SolidPreference::Default,
            compression_preference: CompressionPreference::NoPreference,
        }
    }

    /// Creates an input from bytes already in memory.
    pub fn from_bytes(relative_path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::from_provider(relative_path, Arc::new(FromArrayProvider::new(data)))
    }

    /// Reads `full_path` lazily; only its size is queried now.
    pub fn from_path(relative_path: impl Into<String>, full_path: impl Into<PathBuf>) -> Result<Self> {
        let provider = FromFilePathProvider::new(full_path)?;
        Ok(Self::from_provider(relative_path, Arc::new(provider)))
    }

    pub(crate) fn from_path_with_len(
        relative_path: impl Into<String>,
        full_path: impl Into<PathBuf>,
        len: u64,
    ) -> Self {
        Self::from_provider(
            relative_path,
            Arc::new(FromFilePathProvider::with_len(full_path, len)),
        )
    }

    /// `NoSolid` gives the file a block of its own.
    pub fn with_solid_preference(mut self, preference: SolidPreference) -> Self {
        self.solid_preference = preference;
        self
    }

    /// Overrides the session's algorithm for blocks holding only this file.
    pub fn with_compression(mut self, preference: CompressionPreference) -> Self {
        self.compression_preference = preference;
        self
    }

    /// Normalized archive path.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Size in bytes as reported by the provider at construction.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn solid_preference(&self) -> SolidPreference {
        self.solid_preference
    }

    pub fn compression_preference(&self) -> CompressionPreference {
        self.compression_preference
    }

    pub fn provider(&self) -> &Arc<dyn FileDataProvider> {
        &self.provider
    }

    /// Reads `len` bytes starting at `start`.
    ///
    /// # Arguments
    /// * `start` - Offset into the file
    /// * `len` - Number of bytes; `start + len` must not pass [`Self::size`]
    pub fn read(&self, start: u64, len: u64) -> Result<FileData> {
        self.provider.get_file_data(start, len)
    }

    /// Extension used for grouping: text after the last `.` of the file
    /// name, or empty.
    pub fn extension(&self) -> &str {
        let name = self
            .relative_path
            .rsplit('/')
            .next()
            .unwrap_or(self.relative_path.as_str());
        match name.rfind('.') {
            Some(0) | None => "",
            Some(dot) => &name[dot + 1..],
        }
    }
}

fn normalize_path(path: String) -> String {
    if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path
    }
}
