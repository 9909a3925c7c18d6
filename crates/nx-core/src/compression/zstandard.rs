use std::io::Read;

use crate::{NxError, Result};

/// Worst-case output size for `source_len` input bytes.
pub fn max_compressed_size(source_len: usize) -> usize {
    zstd::zstd_safe::compress_bound(source_len)
}

/// Compresses `source` as a single zstd frame, returning the bytes written.
///
/// # Arguments
/// * `level` - zstd level, 1..=22 after settings are sanitized
/// * `source` - Bytes to compress
/// * `destination` - Output buffer of at least [`max_compressed_size`] bytes
pub fn compress(level: i32, source: &[u8], destination: &mut [u8]) -> Result<usize> {
    zstd::bulk::compress_to_buffer(source, destination, level)
        .map_err(|err| NxError::CompressionError(format!("zstd: {err}")))
}

/// Decompresses one frame into `destination`, returning the bytes written.
pub fn decompress(source: &[u8], destination: &mut [u8]) -> Result<usize> {
    zstd::bulk::decompress_to_buffer(source, destination)
        .map_err(|err| NxError::DecompressionError(format!("zstd: {err}")))
}

/// Streams only as many bytes as `destination` holds, then stops.
pub fn decompress_prefix(source: &[u8], destination: &mut [u8]) -> Result<()> {
    let mut decoder = zstd::stream::read::Decoder::with_buffer(source)
        .map_err(|err| NxError::DecompressionError(format!("zstd: {err}")))?;
    decoder
        .read_exact(destination)
        .map_err(|err| NxError::DecompressionError(format!("zstd partial read: {err}")))
}
