//! LZ4 block codec.
//!
//! Blocks are raw LZ4 block format without a size prefix; the archive
//! stores sizes in the ToC instead. Levels below [`MIN_HC_LEVEL`] use the
//! fast encoder; higher levels use LZ4 HC with the level as its search
//! depth. Both produce the same block format, so one decoder reads either.

use lz4::block::CompressionMode;

use crate::{NxError, Result};

/// Lowest level routed to the high-compression encoder.
pub const MIN_HC_LEVEL: i32 = 3;

/// Worst-case output size for `source_len` input bytes, for either encoder.
pub fn max_compressed_size(source_len: usize) -> usize {
    lz4_flex::block::get_maximum_output_size(source_len)
}

/// Compresses `source` into `destination`, returning the bytes written.
///
/// # Arguments
/// * `level` - 1..=2 selects the fast encoder, 3..=12 LZ4 HC
/// * `source` - Bytes to compress
/// * `destination` - Output buffer of at least [`max_compressed_size`] bytes
pub fn compress(level: i32, source: &[u8], destination: &mut [u8]) -> Result<usize> {
    if level < MIN_HC_LEVEL {
        return lz4_flex::block::compress_into(source, destination)
            .map_err(|err| NxError::CompressionError(format!("lz4: {err}")));
    }

    lz4::block::compress_to_buffer(
        source,
        Some(CompressionMode::HIGHCOMPRESSION(level)),
        false,
        destination,
    )
    .map_err(|err| NxError::CompressionError(format!("lz4 hc level {level}: {err}")))
}

/// Decodes a raw LZ4 block into `destination`.
pub fn decompress(source: &[u8], destination: &mut [u8]) -> Result<usize> {
    lz4_flex::block::decompress_into(source, destination)
        .map_err(|err| NxError::DecompressionError(format!("lz4: {err}")))
}

/// Fills `destination` with the leading bytes of the decompressed block.
pub fn decompress_prefix(
    source: &[u8],
    destination: &mut [u8],
    block_capacity: usize,
) -> Result<()> {
    let wanted = destination.len();
    let written = if block_capacity <= wanted {
        decompress(source, destination)?
    } else {
        let mut scratch = vec![0u8; block_capacity];
        let written = decompress(source, &mut scratch)?;
        let copied = written.min(wanted);
        destination[..copied].copy_from_slice(&scratch[..copied]);
        written
    };

    if written < wanted {
        return Err(NxError::DecompressionError(format!(
            "lz4 block decompressed to {written} bytes, {wanted} requested"
        )));
    }
    Ok(())
}
