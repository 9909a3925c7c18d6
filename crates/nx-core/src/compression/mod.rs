use std::time::Instant;

use crate::telemetry::{self, tags};
use crate::types::CompressionPreference;
use crate::{NxError, Result};

pub mod lz4;
pub mod zstandard;

/// Result of [`compress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOutcome {
    /// Bytes written to the destination.
    pub written: usize,
    /// Method to store beside the block; `Copy` after a fallback.
    pub method: CompressionPreference,
    /// True when the requested codec did not shrink the data.
    pub used_copy_fallback: bool,
}

/// Worst-case output size across every supported method.
pub fn max_alloc_for_compress_size(source_len: usize) -> usize {
    [
        CompressionPreference::Copy,
        CompressionPreference::Zstandard,
        CompressionPreference::Lz4,
    ]
    .into_iter()
    .map(|method| alloc_for_compress_size(method, source_len))
    .max()
    .unwrap_or(source_len)
}

/// Worst-case output size of `method` for `source_len` input bytes.
pub fn alloc_for_compress_size(method: CompressionPreference, source_len: usize) -> usize {
    match method {
        CompressionPreference::NoPreference | CompressionPreference::Copy => source_len,
        CompressionPreference::Zstandard => zstandard::max_compressed_size(source_len),
        CompressionPreference::Lz4 => lz4::max_compressed_size(source_len),
    }
}

/// Compresses `source` into `destination`, falling back to a raw copy when
/// the codec does not make the data smaller.
///
/// `destination` must hold at least [`alloc_for_compress_size`] bytes.
pub fn compress(
    method: CompressionPreference,
    level: i32,
    source: &[u8],
    destination: &mut [u8],
) -> Result<CompressionOutcome> {
    let started_at = Instant::now();
    let written = match method {
        CompressionPreference::NoPreference | CompressionPreference::Copy => {
            return copy(source, destination).map(|written| CompressionOutcome {
                written,
                method: CompressionPreference::Copy,
                used_copy_fallback: false,
            });
        }
        CompressionPreference::Zstandard => zstandard::compress(level, source, destination)?,
        CompressionPreference::Lz4 => lz4::compress(level, source, destination)?,
    };

    telemetry::increment_counter(tags::METRIC_COMPRESSION_APPLY_COUNT, 1);
    telemetry::record_histogram(
        tags::METRIC_COMPRESSION_APPLY_LATENCY_US,
        telemetry::elapsed_us(started_at),
    );

    if written >= source.len() {
        telemetry::increment_counter(tags::METRIC_COMPRESSION_COPY_FALLBACK_COUNT, 1);
        let written = copy(source, destination)?;
        return Ok(CompressionOutcome {
            written,
            method: CompressionPreference::Copy,
            used_copy_fallback: true,
        });
    }

    Ok(CompressionOutcome {
        written,
        method,
        used_copy_fallback: false,
    })
}

/// Fully decompresses `source` into `destination`, returning the bytes written.
pub fn decompress(
    method: CompressionPreference,
    source: &[u8],
    destination: &mut [u8],
) -> Result<usize> {
    let started_at = Instant::now();
    let written = match method {
        CompressionPreference::NoPreference | CompressionPreference::Copy => {
            copy(source, destination)?
        }
        CompressionPreference::Zstandard => zstandard::decompress(source, destination)?,
        CompressionPreference::Lz4 => lz4::decompress(source, destination)?,
    };

    telemetry::increment_counter(tags::METRIC_COMPRESSION_REVERSE_COUNT, 1);
    telemetry::record_histogram(
        tags::METRIC_COMPRESSION_REVERSE_LATENCY_US,
        telemetry::elapsed_us(started_at),
    );
    Ok(written)
}

/// Decompresses exactly `destination.len()` leading bytes of a block.
///
/// Zstandard stops as soon as the destination is full. LZ4 cannot stop
/// early, so it decodes into scratch space of `block_capacity` bytes (the
/// largest size the block may decompress to) when the destination is smaller.
pub fn decompress_partial(
    method: CompressionPreference,
    source: &[u8],
    destination: &mut [u8],
    block_capacity: usize,
) -> Result<()> {
    let started_at = Instant::now();
    match method {
        CompressionPreference::NoPreference | CompressionPreference::Copy => {
            let wanted = destination.len();
            if source.len() < wanted {
                return Err(NxError::DecompressionError(format!(
                    "stored block holds {} bytes, {wanted} requested",
                    source.len()
                )));
            }
            destination.copy_from_slice(&source[..wanted]);
        }
        CompressionPreference::Zstandard => zstandard::decompress_prefix(source, destination)?,
        CompressionPreference::Lz4 => lz4::decompress_prefix(source, destination, block_capacity)?,
    }

    telemetry::increment_counter(tags::METRIC_COMPRESSION_REVERSE_COUNT, 1);
    telemetry::record_histogram(
        tags::METRIC_COMPRESSION_REVERSE_LATENCY_US,
        telemetry::elapsed_us(started_at),
    );
    Ok(())
}

fn copy(source: &[u8], destination: &mut [u8]) -> Result<usize> {
    if destination.len() < source.len() {
        return Err(NxError::CompressionError(format!(
            "copy needs {} bytes, destination holds {}",
            source.len(),
            destination.len()
        )));
    }

    destination[..source.len()].copy_from_slice(source);
    Ok(source.len())
}
