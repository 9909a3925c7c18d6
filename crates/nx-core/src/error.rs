use thiserror::Error;

#[derive(Debug, Error)]
pub enum NxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a Nexus archive (magic {found:#010x})")]
    NotNexusArchive { found: u32 },
    #[error("unsupported archive version {0}")]
    UnsupportedArchiveVersion(u8),
    #[error("unsupported table of contents version {0}")]
    UnsupportedTocVersion(u8),
    #[error("unsupported compression method tag {0}")]
    UnsupportedCompression(u8),
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),
    #[error("compressed string pool is {size} bytes, exceeding the {max} byte limit")]
    InsufficientStringPoolSize { size: usize, max: usize },
    #[error("file of {size} bytes exceeds the {max} byte limit of array output")]
    FileTooLargeForArray { size: u64, max: u64 },
    #[error("{what} count {count} exceeds the format limit of {max}")]
    CapacityExceeded {
        what: &'static str,
        count: u64,
        max: u64,
    },
    #[error("packer buffer pool exhausted ({slots} slots already rented)")]
    PoolExhausted { slots: usize },
    #[error("source archives use different chunk sizes (expected {expected}, found {actual})")]
    ChunkSizeMismatch { expected: u32, actual: u32 },
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("decompression error: {0}")]
    DecompressionError(String),
    #[error("invalid block turn (expected {expected}, actual {actual})")]
    InvalidBlockId { expected: u64, actual: u64 },
    #[error("operation cancelled")]
    Cancelled,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<NxError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl NxError {
    /// Wraps the error with a description of the failed operation.
    ///
    /// # Arguments
    /// * `context` - What was being done, such as `"open archive a.nx"`
    pub fn with_context(self, context: impl Into<String>) -> Self {
        NxError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true when the error only reports that work was abandoned
    /// because another failure (or the caller) cancelled the operation.
    pub fn is_cancellation(&self) -> bool {
        match self {
            NxError::Cancelled => true,
            NxError::Context { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}
