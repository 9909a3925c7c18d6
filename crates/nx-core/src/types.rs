use std::ops::Deref;
use std::sync::Arc;

use bytes::Bytes;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

use crate::error::NxError;

pub type Result<T> = std::result::Result<T, NxError>;

/// Bytes handed out by a [`FileDataProvider`](crate::io::FileDataProvider).
///
/// Owned data is reference counted through [`Bytes`]; mapped data keeps the
/// backing map alive for as long as the slice is held.
#[derive(Debug, Clone)]
pub enum FileData {
    Owned(Bytes),
    Mapped {
        map: Arc<Mmap>,
        start: usize,
        end: usize,
    },
}

impl FileData {
    pub fn empty() -> Self {
        Self::Owned(Bytes::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Owned(data) => data.len(),
            Self::Mapped { start, end, .. } => end - start,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows the bytes without copying, for either variant.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(data) => &data[..],
            Self::Mapped { map, start, end } => &map[*start..*end],
        }
    }

    /// Converts the data to an owned [`Bytes`].
    ///
    /// Owned data is a cheap reference-counted clone; mapped data is copied.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Owned(data) => data.clone(),
            Self::Mapped { map, start, end } => Bytes::copy_from_slice(&map[*start..*end]),
        }
    }
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for FileData {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<FileData> for Bytes {
    fn from(data: FileData) -> Self {
        data.to_bytes()
    }
}

/// Compression method of a block, or the caller's preference for one.
///
/// `NoPreference` only appears in settings and per-file overrides; it is
/// resolved before a block is compressed and stored on the wire as `Copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CompressionPreference {
    #[default]
    NoPreference,
    Copy,
    Zstandard,
    Lz4,
}

impl CompressionPreference {
    /// Encodes the method into the 3-bit tag stored beside each block size.
    pub fn to_tag(self) -> u8 {
        match self {
            Self::NoPreference | Self::Copy => 0,
            Self::Zstandard => 1,
            Self::Lz4 => 2,
        }
    }

    /// Decodes a stored 3-bit block tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Copy),
            1 => Ok(Self::Zstandard),
            2 => Ok(Self::Lz4),
            other => Err(NxError::UnsupportedCompression(other)),
        }
    }

    /// Returns `self`, or `fallback` when no preference was given.
    pub fn or(self, fallback: CompressionPreference) -> Self {
        match self {
            Self::NoPreference => fallback,
            other => other,
        }
    }

    /// Short lowercase name used in logs and listings.
    pub fn name(self) -> &'static str {
        match self {
            Self::NoPreference => "none",
            Self::Copy => "copy",
            Self::Zstandard => "zstd",
            Self::Lz4 => "lz4",
        }
    }
}

/// Whether a file may share a SOLID block with others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SolidPreference {
    #[default]
    Default,
    NoSolid,
}
