use crate::core::CancellationToken;
use crate::telemetry::tags;

/// Options for extraction.
#[derive(Debug, Clone)]
pub struct UnpackerSettings {
    pub max_threads: usize,
    /// Re-hash every extracted file and fail on a mismatch with its entry.
    pub verify_hashes: bool,
    pub cancellation: Option<CancellationToken>,
}

impl Default for UnpackerSettings {
    fn default() -> Self {
        Self {
            max_threads: num_cpus::get().max(1),
            verify_hashes: false,
            cancellation: None,
        }
    }
}

impl UnpackerSettings {
    /// Caps the number of extraction workers.
    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Re-hashes every extracted file against the hash stored in its entry.
    pub fn with_verify_hashes(mut self, verify_hashes: bool) -> Self {
        self.verify_hashes = verify_hashes;
        self
    }

    /// Raises a zero thread count to one.
    pub fn sanitize(&mut self) {
        if self.max_threads == 0 {
            tracing::warn!(target: tags::TARGET_UNPACK, "thread count raised to 1");
            self.max_threads = 1;
        }
    }
}
