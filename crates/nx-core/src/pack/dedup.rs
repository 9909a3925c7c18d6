//! Per-session deduplication maps.
//!
//! A packing session owns fresh instances through its context; nothing here
//! outlives one pack.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::core::lock_unpoisoned;

/// Where the first copy of some SOLID file content was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidLocation {
    pub block_index: u32,
    pub decompressed_offset: u32,
}

/// Content hash to first location for small files.
///
/// Lookups run inside the packer's deduplication turn, so the copy in the
/// lowest block index always becomes the original.
#[derive(Debug, Default)]
pub struct SolidDeduplicationState {
    locations: Mutex<HashMap<u64, SolidLocation>>,
}

impl SolidDeduplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `candidate` for `hash` unless the hash was seen before, in
    /// which case the earlier location is returned and nothing changes.
    pub fn find_or_insert(&self, hash: u64, candidate: SolidLocation) -> Option<SolidLocation> {
        match lock_unpoisoned(&self.locations).entry(hash) {
            Entry::Occupied(existing) => Some(*existing.get()),
            Entry::Vacant(slot) => {
                slot.insert(candidate);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.locations).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Two-level map for chunked files: a set of short hashes acting as a cheap
/// filter, and full-file hashes pointing at the first block of the original.
#[derive(Debug, Default)]
pub struct ChunkedDeduplicationState {
    inner: Mutex<ChunkedMaps>,
}

#[derive(Debug, Default)]
struct ChunkedMaps {
    short_hashes: HashSet<u64>,
    full_hashes: HashMap<u64, u32>,
}

impl ChunkedDeduplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `short_hash`, returning true if another file already had it.
    pub fn insert_short_hash(&self, short_hash: u64) -> bool {
        !lock_unpoisoned(&self.inner).short_hashes.insert(short_hash)
    }

    /// First block of an earlier file with this full hash.
    pub fn find_full_hash(&self, full_hash: u64) -> Option<u32> {
        lock_unpoisoned(&self.inner)
            .full_hashes
            .get(&full_hash)
            .copied()
    }

    /// Keeps the first registration for a hash.
    pub fn register_full_hash(&self, full_hash: u64, first_block_index: u32) {
        lock_unpoisoned(&self.inner)
            .full_hashes
            .entry(full_hash)
            .or_insert(first_block_index);
    }

    /// Number of chunked files registered as originals.
    pub fn full_hash_count(&self) -> usize {
        lock_unpoisoned(&self.inner).full_hashes.len()
    }
}
