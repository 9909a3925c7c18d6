#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use nx_core::io::FromArrayProvider;
use nx_core::{NxPacker, NxUnpacker, PackerFile, PackerSettings, UnpackerSettings};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * 1024;

/// Smallest representable block size, so modest inputs already span blocks.
pub const SMALL_BLOCK: u32 = 32 * 1024 - 1;
/// Smallest representable chunk size.
pub const SMALL_CHUNK: u32 = 512 * 1024;

pub fn small_settings(threads: usize) -> PackerSettings {
    PackerSettings::default()
        .with_block_size(SMALL_BLOCK)
        .with_chunk_size(SMALL_CHUNK)
        .with_max_threads(threads)
}

pub fn pack_in_memory(
    files: Vec<PackerFile>,
    settings: PackerSettings,
) -> nx_core::Result<Vec<u8>> {
    Ok(NxPacker::pack(files, settings, Cursor::new(Vec::new()))?.into_inner())
}

pub fn open_in_memory(archive: Vec<u8>) -> nx_core::Result<NxUnpacker> {
    NxUnpacker::open(Arc::new(FromArrayProvider::new(archive)))
}

/// Extracts every entry, keyed by path.
pub fn extract_all(unpacker: &NxUnpacker) -> nx_core::Result<BTreeMap<String, Vec<u8>>> {
    let entries = unpacker.file_entries().to_vec();
    let settings = UnpackerSettings::default().with_verify_hashes(true);
    Ok(unpacker
        .extract_in_memory(&entries, settings)?
        .into_iter()
        .map(|file| (file.relative_path, file.data))
        .collect())
}

/// Compressible bytes with some structure, different per seed.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|index| {
            let word = (index / 7) as u8;
            word.wrapping_mul(31).wrapping_add(seed) ^ (index % 5) as u8
        })
        .collect()
}

/// Incompressible bytes from a xorshift generator.
pub fn noise(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// Text built from a small vocabulary in noise-driven order.
pub fn word_salad(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: [&str; 12] = [
        "archive", "block", "chunk", "solid", "header", "entry", "pool", "the", "of", "zstd",
        "lz4", "page",
    ];
    let picks = noise(len, seed);
    let mut text = Vec::with_capacity(len + 16);
    for pick in picks {
        if text.len() >= len {
            break;
        }
        text.extend_from_slice(WORDS[pick as usize % WORDS.len()].as_bytes());
        text.push(b' ');
    }
    text.truncate(len);
    text
}
