use nx_core::headers::{
    BlockSize, NativeFileHeader, NativeTocHeader, OffsetPathIndexTuple, TableOfContentsVersion,
    pack_block_word, unpack_block_word,
};
use nx_core::{CompressionPreference, NxError};

const NATIVE_FIELDS: [(u32, &str); 5] = [
    (4, "version"),
    (4, "block_size_code"),
    (3, "chunk_size_code"),
    (13, "toc_page_count"),
    (8, "feature_flags"),
];

fn boundary_values(bits: u32) -> [u64; 3] {
    let max = (1u64 << bits) - 1;
    [0, max, max + 1]
}

fn set_native(header: &mut NativeFileHeader, field: usize, value: u64) {
    match field {
        0 => header.set_version(value as u8),
        1 => header.set_block_size_code(value as u8),
        2 => header.set_chunk_size_code(value as u8),
        3 => header.set_toc_page_count(value as u32),
        _ => header.set_feature_flags(value as u8),
    }
}

fn get_native(header: &NativeFileHeader, field: usize) -> u64 {
    match field {
        0 => header.version() as u64,
        1 => header.block_size_code() as u64,
        2 => header.chunk_size_code() as u64,
        3 => header.toc_page_count() as u64,
        _ => header.feature_flags() as u64,
    }
}

#[test]
fn native_header_fields_do_not_bleed() {
    let sentinels = [5u64, 9, 3, 4321, 0xA5];
    for (left, (left_bits, left_name)) in NATIVE_FIELDS.iter().enumerate() {
        for (right, (right_bits, _)) in NATIVE_FIELDS.iter().enumerate() {
            if left == right {
                continue;
            }
            for left_value in boundary_values(*left_bits) {
                for right_value in boundary_values(*right_bits) {
                    let mut header = NativeFileHeader::default();
                    for (field, sentinel) in sentinels.iter().enumerate() {
                        set_native(&mut header, field, *sentinel);
                    }
                    set_native(&mut header, left, left_value);
                    set_native(&mut header, right, right_value);

                    let left_mask = (1u64 << left_bits) - 1;
                    assert_eq!(
                        get_native(&header, left),
                        left_value & left_mask,
                        "{left_name} truncation"
                    );
                    for (field, sentinel) in sentinels.iter().enumerate() {
                        if field != left && field != right {
                            assert_eq!(get_native(&header, field), *sentinel);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn toc_header_fields_do_not_bleed() {
    let widths = [20u32, 18, 24, 2];
    let sentinels = [777u64, 4242, 65_537, 1];
    let set = |header: &mut NativeTocHeader, field: usize, value: u64| match field {
        0 => header.set_file_count(value as u32),
        1 => header.set_block_count(value as u32),
        2 => header.set_string_pool_size(value as u32),
        _ => header.set_version_raw(value as u8),
    };
    let get = |header: &NativeTocHeader, field: usize| -> u64 {
        match field {
            0 => header.file_count() as u64,
            1 => header.block_count() as u64,
            2 => header.string_pool_size() as u64,
            _ => header.version_raw() as u64,
        }
    };

    for left in 0..widths.len() {
        for right in 0..widths.len() {
            if left == right {
                continue;
            }
            for left_value in boundary_values(widths[left]) {
                for right_value in boundary_values(widths[right]) {
                    let mut header = NativeTocHeader::default();
                    for (field, sentinel) in sentinels.iter().enumerate() {
                        set(&mut header, field, *sentinel);
                    }
                    set(&mut header, left, left_value);
                    set(&mut header, right, right_value);

                    assert_eq!(get(&header, left), left_value & ((1u64 << widths[left]) - 1));
                    assert_eq!(get(&header, right), right_value & ((1u64 << widths[right]) - 1));
                    for (field, sentinel) in sentinels.iter().enumerate() {
                        if field != left && field != right {
                            assert_eq!(get(&header, field), *sentinel);
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn entry_tuple_fields_do_not_bleed() {
    let widths = [26u32, 20, 18];
    for first in boundary_values(widths[0]) {
        for second in boundary_values(widths[1]) {
            for third in boundary_values(widths[2]) {
                let tuple = OffsetPathIndexTuple::new(first as u32, second as u32, third as u32);
                assert_eq!(tuple.decompressed_block_offset() as u64, first & ((1 << 26) - 1));
                assert_eq!(tuple.file_path_index() as u64, second & ((1 << 20) - 1));
                assert_eq!(tuple.first_block_index() as u64, third & ((1 << 18) - 1));
            }
        }
    }
}

#[test]
fn entry_tuple_layout_matches_wire_shifts() {
    let tuple = OffsetPathIndexTuple::new(3, 2, 1);
    assert_eq!(tuple.raw(), (3u64 << 38) | (2u64 << 18) | 1);
    assert_eq!(OffsetPathIndexTuple::from_raw(tuple.raw()), tuple);
}

#[test]
fn toc_header_layout_matches_wire_shifts() -> Result<(), Box<dyn std::error::Error>> {
    let header = NativeTocHeader::new(3, 2, 17, TableOfContentsVersion::V1);
    assert_eq!(header.raw(), (3u64 << 44) | (2u64 << 26) | (17u64 << 2) | 1);
    assert_eq!(header.version()?, TableOfContentsVersion::V1);
    assert_eq!(NativeTocHeader::from_bytes(&header.to_bytes())?, header);
    Ok(())
}

#[test]
fn block_word_round_trips_every_method() -> Result<(), Box<dyn std::error::Error>> {
    for method in [
        CompressionPreference::Copy,
        CompressionPreference::Zstandard,
        CompressionPreference::Lz4,
    ] {
        for size in [0u32, 1, 4096, (1 << 29) - 1] {
            let word = pack_block_word(BlockSize::new(size), method);
            assert_eq!(word & 0b111, method.to_tag() as u32);
            let (block, decoded) = unpack_block_word(word)?;
            assert_eq!(block.compressed_size, size);
            assert_eq!(decoded, method);
        }
    }
    Ok(())
}

#[test]
fn unknown_block_tags_are_rejected() {
    for tag in 3u32..=7 {
        match unpack_block_word((10 << 3) | tag) {
            Err(NxError::UnsupportedCompression(found)) => assert_eq!(found as u32, tag),
            other => panic!("tag {tag} unexpectedly decoded: {other:?}"),
        }
    }
}

#[test]
fn native_header_layout_matches_wire_shifts() -> Result<(), Box<dyn std::error::Error>> {
    let mut header = NativeFileHeader::new(5, 2, 3);
    header.set_feature_flags(0x11);
    let bytes = header.to_bytes();
    assert_eq!(&bytes[..4], &0x5355_584Eu32.to_le_bytes());
    let packed = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    assert_eq!(packed, (5 << 24) | (2 << 21) | (3 << 8) | 0x11);

    let parsed = NativeFileHeader::from_bytes(&bytes)?;
    assert_eq!(parsed, header);
    assert_eq!(parsed.block_size(), (32_768 << 5) - 1);
    assert_eq!(parsed.chunk_size(), (512 * 1024) << 2);
    assert_eq!(parsed.header_page_bytes(), 3 * 4096);
    Ok(())
}
