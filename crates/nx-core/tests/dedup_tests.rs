mod support;

use std::collections::BTreeMap;

use nx_core::{FileEntry, NxUnpacker, PackerFile};
use support::{
    KIB, SMALL_CHUNK, TestResult, extract_all, noise, open_in_memory, pack_in_memory, patterned,
    small_settings,
};

fn entries_by_path(unpacker: &NxUnpacker) -> BTreeMap<String, FileEntry> {
    unpacker
        .file_entries()
        .iter()
        .filter_map(|entry| Some((unpacker.file_path(entry)?.to_owned(), *entry)))
        .collect()
}

fn empty_block_count(unpacker: &NxUnpacker) -> usize {
    unpacker
        .header()
        .blocks
        .iter()
        .filter(|block| block.compressed_size == 0)
        .count()
}

#[test]
fn identical_small_files_share_one_location() -> TestResult {
    let shared = patterned(3 * KIB, 4);
    let files = vec![
        PackerFile::from_bytes("a/config.txt", shared.clone()),
        PackerFile::from_bytes("b/config.txt", shared.clone()),
        PackerFile::from_bytes("c/config.txt", shared.clone()),
        PackerFile::from_bytes("d/other.txt", patterned(3 * KIB, 5)),
    ];
    let archive = pack_in_memory(files, small_settings(4))?;
    let unpacker = open_in_memory(archive)?;
    let entries = entries_by_path(&unpacker);

    let original = entries["a/config.txt"];
    for path in ["b/config.txt", "c/config.txt"] {
        let copy = entries[path];
        assert_eq!(copy.first_block_index, original.first_block_index, "{path}");
        assert_eq!(copy.decompressed_block_offset, original.decompressed_block_offset, "{path}");
        assert_eq!(copy.hash, original.hash);
    }
    let other = entries["d/other.txt"];
    assert!(
        other.first_block_index != original.first_block_index
            || other.decompressed_block_offset != original.decompressed_block_offset
    );

    let extracted = extract_all(&unpacker)?;
    assert_eq!(extracted["c/config.txt"], shared);
    Ok(())
}

#[test]
fn small_duplicates_across_blocks_resolve() -> TestResult {
    // 10 KiB files fill a 32 KiB block after three, so copies land in
    // several blocks and may reference any of them.
    let shared = noise(10 * KIB, 77);
    let mut files = Vec::new();
    for index in 0..12 {
        files.push(PackerFile::from_bytes(format!("copies/{index:02}.bin"), shared.clone()));
        files.push(PackerFile::from_bytes(
            format!("unique/{index:02}.bin"),
            noise(10 * KIB, 100 + index as u64),
        ));
    }
    let archive = pack_in_memory(files, small_settings(8))?;
    let unpacker = open_in_memory(archive)?;

    let locations: Vec<(u32, u32)> = entries_by_path(&unpacker)
        .into_iter()
        .filter(|(path, _)| path.starts_with("copies/"))
        .map(|(_, entry)| (entry.first_block_index, entry.decompressed_block_offset))
        .collect();
    assert_eq!(locations.len(), 12);
    assert!(locations.windows(2).all(|pair| pair[0] == pair[1]));

    for (path, data) in extract_all(&unpacker)? {
        if path.starts_with("copies/") {
            assert_eq!(data, shared, "{path}");
        }
    }
    Ok(())
}

#[test]
fn empty_files_are_never_deduplicated_against_content() -> TestResult {
    let files = vec![
        PackerFile::from_bytes("first.empty", Vec::new()),
        PackerFile::from_bytes("second.empty", Vec::new()),
        PackerFile::from_bytes("body.empty", b"not actually empty".to_vec()),
    ];
    let archive = pack_in_memory(files, small_settings(1))?;
    let unpacker = open_in_memory(archive)?;
    let extracted = extract_all(&unpacker)?;
    assert!(extracted["first.empty"].is_empty());
    assert!(extracted["second.empty"].is_empty());
    assert_eq!(extracted["body.empty"], b"not actually empty");
    Ok(())
}

#[test]
fn identical_large_files_store_chunks_once() -> TestResult {
    let big = patterned(SMALL_CHUNK as usize * 2 + 100, 21);
    let files = vec![
        PackerFile::from_bytes("original.bin", big.clone()),
        PackerFile::from_bytes("mirror/original.bin", big.clone()),
    ];
    let archive = pack_in_memory(files, small_settings(4))?;
    let unpacker = open_in_memory(archive)?;
    let chunk_size = unpacker.header().chunk_size();

    let entries = entries_by_path(&unpacker);
    let first = entries["original.bin"];
    let second = entries["mirror/original.bin"];
    assert_eq!(first.first_block_index, second.first_block_index);
    assert_eq!(first.hash, second.hash);
    assert_eq!(first.chunk_count(chunk_size), 3);

    assert_eq!(unpacker.header().blocks.len(), 6);
    assert_eq!(empty_block_count(&unpacker), 3);
    let shared_start = first.first_block_index as usize;
    for block in &unpacker.header().blocks[shared_start..shared_start + 3] {
        assert!(block.compressed_size > 0);
    }

    let extracted = extract_all(&unpacker)?;
    assert_eq!(extracted["original.bin"], big);
    assert_eq!(extracted["mirror/original.bin"], big);
    Ok(())
}

#[test]
fn repeated_large_files_resolve_to_the_first_copy() -> TestResult {
    let big = patterned(SMALL_CHUNK as usize + 3 * KIB, 44);
    let other = patterned(SMALL_CHUNK as usize + 3 * KIB, 45);
    let mut files: Vec<PackerFile> = (0..4)
        .map(|index| PackerFile::from_bytes(format!("copies/{index}.bin"), big.clone()))
        .collect();
    files.push(PackerFile::from_bytes("copies/other.bin", other.clone()));

    let archive = pack_in_memory(files, small_settings(8))?;
    let unpacker = open_in_memory(archive)?;
    let entries = entries_by_path(&unpacker);

    let first_blocks: Vec<u32> = (0..4)
        .map(|index| entries[&format!("copies/{index}.bin")].first_block_index)
        .collect();
    assert!(first_blocks.iter().all(|block| *block == first_blocks[0]));
    assert_ne!(entries["copies/other.bin"].first_block_index, first_blocks[0]);

    assert_eq!(unpacker.header().blocks.len(), 10);
    assert_eq!(empty_block_count(&unpacker), 6);

    let extracted = extract_all(&unpacker)?;
    for index in 0..4 {
        assert_eq!(extracted[&format!("copies/{index}.bin")], big);
    }
    assert_eq!(extracted["copies/other.bin"], other);
    Ok(())
}

#[test]
fn shared_prefix_alone_is_not_a_duplicate() -> TestResult {
    let left = patterned(SMALL_CHUNK as usize + 50_000, 30);
    let mut right = left.clone();
    let tail = right.len() - 1;
    right[tail] ^= 0xFF;

    let files = vec![
        PackerFile::from_bytes("left.bin", left.clone()),
        PackerFile::from_bytes("right.bin", right.clone()),
    ];
    let archive = pack_in_memory(files, small_settings(2))?;
    let unpacker = open_in_memory(archive)?;

    let entries = entries_by_path(&unpacker);
    assert_ne!(entries["left.bin"].first_block_index, entries["right.bin"].first_block_index);
    assert_ne!(entries["left.bin"].hash, entries["right.bin"].hash);
    assert_eq!(empty_block_count(&unpacker), 0);

    let extracted = extract_all(&unpacker)?;
    assert_eq!(extracted["left.bin"], left);
    assert_eq!(extracted["right.bin"], right);
    Ok(())
}

#[test]
fn disabled_deduplication_stores_every_copy() -> TestResult {
    let small = patterned(2 * KIB, 8);
    let big = patterned(SMALL_CHUNK as usize + 1, 9);
    let files = vec![
        PackerFile::from_bytes("one.txt", small.clone()),
        PackerFile::from_bytes("two.txt", small.clone()),
        PackerFile::from_bytes("one.bin", big.clone()),
        PackerFile::from_bytes("two.bin", big.clone()),
    ];
    let archive = pack_in_memory(files, small_settings(3).with_deduplication(false))?;
    let unpacker = open_in_memory(archive)?;
    let entries = entries_by_path(&unpacker);

    let (one, two) = (entries["one.txt"], entries["two.txt"]);
    assert_eq!(one.first_block_index, two.first_block_index);
    assert_ne!(one.decompressed_block_offset, two.decompressed_block_offset);
    assert_ne!(entries["one.bin"].first_block_index, entries["two.bin"].first_block_index);
    assert_eq!(empty_block_count(&unpacker), 0);

    let extracted = extract_all(&unpacker)?;
    assert_eq!(extracted["two.txt"], small);
    assert_eq!(extracted["two.bin"], big);
    Ok(())
}
