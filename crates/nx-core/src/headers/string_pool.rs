//! Sorted, null-terminated, Zstandard-compressed table of relative paths.

use std::time::Instant;

use crate::headers::consts::{MAX_STRING_POOL_SIZE, STRING_POOL_COMPRESSION_LEVEL};
use crate::telemetry::{self, tags};
use crate::{NxError, Result};

/// Sorts `paths` in place (byte-wise), drops duplicates from the sorted
/// view and returns the compressed pool.
///
/// Paths are compared ordinally, so entries sharing a directory prefix sit
/// next to each other. The index of a path in the sorted, deduplicated list
/// is its `file_path_index`.
///
/// # Errors
/// Returns [`NxError::InsufficientStringPoolSize`] when the compressed pool
/// does not fit the 24-bit size field.
pub fn pack<S: AsRef<str>>(paths: &mut [S]) -> Result<Vec<u8>> {
    let started_at = Instant::now();
    paths.sort_unstable_by(|left, right| left.as_ref().as_bytes().cmp(right.as_ref().as_bytes()));

    let raw_len: usize = paths.iter().map(|path| path.as_ref().len() + 1).sum();
    let mut raw = Vec::with_capacity(raw_len);
    let mut previous: Option<&str> = None;
    for path in paths.iter() {
        let path = path.as_ref();
        if previous == Some(path) {
            continue;
        }
        raw.extend_from_slice(path.as_bytes());
        raw.push(0);
        previous = Some(path);
    }

    let compressed = zstd::bulk::compress(&raw, STRING_POOL_COMPRESSION_LEVEL)
        .map_err(|err| NxError::CompressionError(format!("string pool: {err}")))?;
    if compressed.len() > MAX_STRING_POOL_SIZE {
        return Err(NxError::InsufficientStringPoolSize {
            size: compressed.len(),
            max: MAX_STRING_POOL_SIZE,
        });
    }

    telemetry::record_histogram(
        tags::METRIC_STRING_POOL_PACK_LATENCY_US,
        telemetry::elapsed_us(started_at),
    );
    Ok(compressed)
}

/// Decompresses a pool and splits it back into paths.
///
/// `file_count_hint` only pre-sizes the result.
pub fn unpack(compressed: &[u8], file_count_hint: usize) -> Result<Vec<String>> {
    if compressed.is_empty() {
        return Ok(Vec::new());
    }

    let raw = zstd::stream::decode_all(compressed)
        .map_err(|err| NxError::DecompressionError(format!("string pool: {err}")))?;

    let mut paths = Vec::with_capacity(file_count_hint);
    let mut start = 0usize;
    for end in find_null_terminators(&raw) {
        let path = std::str::from_utf8(&raw[start..end])
            .map_err(|_| NxError::InvalidFormat("string pool entry is not valid UTF-8"))?;
        paths.push(path.to_owned());
        start = end + 1;
    }

    if start != raw.len() {
        return Err(NxError::InvalidFormat("string pool is missing its final terminator"));
    }

    Ok(paths)
}

/// Offsets of every `0x00` byte in `data`, found with a vectorised scan.
pub fn find_null_terminators(data: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(data.len() / 32);
    offsets.extend(memchr::memchr_iter(0, data));
    offsets
}
