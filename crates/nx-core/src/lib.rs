//! Reading and writing `.nx` archives.
//!
//! An archive is a page-aligned header holding a bit-packed table of
//! contents, followed by independently compressed blocks. Small files share
//! SOLID blocks; large files are split into fixed-size chunks. Packing runs
//! blocks on a worker pool and appends them in index order.
//!
//! ```no_run
//! use nx_core::{NxPacker, NxUnpacker, PackerFile, PackerSettings, UnpackerSettings};
//! use std::io::Cursor;
//! use std::sync::Arc;
//!
//! let files = vec![
//!     PackerFile::from_bytes("docs/readme.txt", b"hello".to_vec()),
//!     PackerFile::from_bytes("data/blob.bin", vec![7u8; 4096]),
//! ];
//! let archive = NxPacker::pack(files, PackerSettings::default(), Cursor::new(Vec::new()))?;
//!
//! let provider = Arc::new(nx_core::io::FromArrayProvider::new(archive.into_inner()));
//! let unpacker = NxUnpacker::open(provider)?;
//! let entries = unpacker.file_entries().to_vec();
//! let extracted = unpacker.extract_in_memory(&entries, UnpackerSettings::default())?;
//! assert_eq!(extracted.len(), 2);
//! # Ok::<(), nx_core::NxError>(())
//! ```

pub mod buffer;
pub mod compression;
pub mod core;
pub mod error;
pub mod hashing;
pub mod headers;
pub mod io;
pub mod pack;
pub mod telemetry;
pub mod types;
pub mod unpack;

pub use buffer::{BufferPool, PackerArrayPool, PackerBuffers, PoolMetricsSnapshot, PooledBuffer};
pub use crate::core::{CancellationToken, TurnGate, WorkerPool, WorkerPoolHandle};
pub use error::NxError;
pub use headers::{FileEntry, ParsedHeader, TableOfContents, TableOfContentsVersion};
pub use io::{FileDataProvider, MmapInput, OutputDataProvider};
pub use pack::{NxPacker, NxRepackerBuilder, PackerFile, PackerSettings, ProgressSnapshot};
pub use types::{CompressionPreference, FileData, Result, SolidPreference};
pub use unpack::{ArchiveListing, ExtractedFile, NxSource, NxUnpacker, UnpackerSettings};
