//! XXH64 content hashing (seed 0) used for file entries and deduplication.

use xxhash_rust::xxh64::{Xxh64, xxh64};

use crate::headers::SHORT_HASH_LENGTH;

pub const HASH_SEED: u64 = 0;

/// XXH64 of `data` with seed 0.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u64 {
    xxh64(data, HASH_SEED)
}

/// Hash of the leading bytes of a file, used as a cheap duplicate filter.
#[inline]
pub fn short_hash(data: &[u8]) -> u64 {
    hash_bytes(&data[..data.len().min(SHORT_HASH_LENGTH)])
}

/// Incremental XXH64 over data fed in pieces.
///
/// Feeding a file chunk by chunk gives the same digest as [`hash_bytes`]
/// over the whole file.
#[derive(Clone)]
pub struct StreamingHasher {
    state: Xxh64,
    fed: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            state: Xxh64::new(HASH_SEED),
            fed: 0,
        }
    }

    /// Feeds the next piece of the stream.
    pub fn update(&mut self, data: &[u8]) {
        self.state.update(data);
        self.fed += data.len() as u64;
    }

    /// Bytes hashed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.fed
    }

    /// Hash of everything fed so far. Can be called more than once.
    pub fn digest(&self) -> u64 {
        self.state.digest()
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamingHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingHasher")
            .field("bytes_hashed", &self.fed)
            .finish_non_exhaustive()
    }
}
