mod support;

use std::collections::BTreeMap;
use std::sync::{Arc, Barrier};
use std::thread;

use nx_core::io::{FileDataProvider, FromArrayProvider};
use nx_core::pack::{FromLazyBlockProvider, LazyDecompressedBlock};
use nx_core::{FileEntry, NxSource, PackerFile};
use support::{KIB, TestResult, pack_in_memory, patterned, small_settings};

const READERS: usize = 8;

/// Packs eight small text files into a single SOLID block.
fn single_block_source() -> nx_core::Result<(Arc<NxSource>, BTreeMap<String, Vec<u8>>)> {
    let files: BTreeMap<String, Vec<u8>> = (0..READERS)
        .map(|index| {
            (
                format!("notes/{index}.txt"),
                patterned(KIB + index * 111, index as u8 + 1),
            )
        })
        .collect();
    let input = files
        .iter()
        .map(|(path, data)| PackerFile::from_bytes(path.clone(), data.clone()))
        .collect();
    let archive = pack_in_memory(input, small_settings(2))?;
    let source = NxSource::open(Arc::new(FromArrayProvider::new(archive)))?;
    Ok((Arc::new(source), files))
}

fn lazy_block_for(source: &Arc<NxSource>) -> (Arc<LazyDecompressedBlock>, Vec<FileEntry>) {
    let entries = source.header().entries.clone();
    let decompressed_len = entries
        .iter()
        .map(|entry| entry.decompressed_block_offset as u64 + entry.decompressed_size)
        .max()
        .unwrap_or(0);
    let block = Arc::new(LazyDecompressedBlock::new(
        Arc::clone(source),
        entries[0].first_block_index,
        decompressed_len as usize,
    ));
    (block, entries)
}

#[test]
fn concurrent_readers_share_one_decompression() -> TestResult {
    let (source, files) = single_block_source()?;
    assert_eq!(source.block_count(), 1);
    let (block, entries) = lazy_block_for(&source);
    assert!(!block.is_decompressed());

    let barrier = Arc::new(Barrier::new(READERS));
    let readers: Vec<_> = entries
        .iter()
        .map(|entry| {
            let provider = FromLazyBlockProvider::new(
                Arc::clone(&block),
                entry.decompressed_block_offset as u64,
                entry.decompressed_size,
            );
            let path = source.header().path_of(entry).unwrap_or_default().to_owned();
            let offset = entry.decompressed_block_offset as usize;
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> nx_core::Result<(String, usize, Vec<u8>)> {
                barrier.wait();
                let data = provider.get_file_data(0, provider.len())?;
                let base = data.as_ptr() as usize - offset;
                Ok((path, base, data.to_vec()))
            })
        })
        .collect();

    let mut bases = Vec::new();
    for reader in readers {
        let (path, base, data) = reader.join().map_err(|_| "reader panicked")??;
        assert_eq!(Some(&data), files.get(&path), "{path} read wrong bytes");
        bases.push(base);
    }

    assert!(block.is_decompressed());
    bases.dedup();
    assert_eq!(bases.len(), 1, "readers saw more than one decompressed buffer");
    Ok(())
}

#[test]
fn block_is_released_with_its_last_provider() -> TestResult {
    let (source, _) = single_block_source()?;
    let (block, entries) = lazy_block_for(&source);
    let tracker = Arc::downgrade(&block);

    let providers: Vec<FromLazyBlockProvider> = entries
        .iter()
        .map(|entry| {
            FromLazyBlockProvider::new(
                Arc::clone(&block),
                entry.decompressed_block_offset as u64,
                entry.decompressed_size,
            )
        })
        .collect();
    drop(block);

    let first = providers[0].get_file_data(0, 16)?;
    assert_eq!(first.len(), 16);
    drop(first);

    let mut providers = providers;
    while providers.len() > 1 {
        providers.pop();
        assert!(tracker.upgrade().is_some(), "block freed while still referenced");
    }
    providers.clear();
    assert_eq!(tracker.strong_count(), 0);
    assert!(tracker.upgrade().is_none());
    Ok(())
}

#[test]
fn empty_reads_do_not_decompress() -> TestResult {
    let (source, _) = single_block_source()?;
    let (block, entries) = lazy_block_for(&source);
    let provider = FromLazyBlockProvider::new(
        Arc::clone(&block),
        entries[1].decompressed_block_offset as u64,
        entries[1].decompressed_size,
    );

    assert!(provider.get_file_data(3, 0)?.is_empty());
    assert!(!block.is_decompressed());
    assert!(provider.get_file_data(0, provider.len() + 1).is_err());
    Ok(())
}
