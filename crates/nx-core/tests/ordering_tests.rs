mod support;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nx_core::io::FileDataProvider;
use nx_core::{CancellationToken, FileData, PackerFile};
use support::{
    KIB, SMALL_CHUNK, TestResult, extract_all, open_in_memory, pack_in_memory, patterned,
    small_settings,
};

/// Serves bytes from memory after sleeping, to hold up one block.
struct SlowProvider {
    data: Bytes,
    delay: Duration,
}

impl fmt::Debug for SlowProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowProvider").field("len", &self.data.len()).finish()
    }
}

impl FileDataProvider for SlowProvider {
    fn get_file_data(&self, start: u64, len: u64) -> nx_core::Result<FileData> {
        thread::sleep(self.delay);
        let start = start as usize;
        Ok(FileData::Owned(self.data.slice(start..start + len as usize)))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug)]
struct FailingProvider {
    len: u64,
    reads: AtomicUsize,
}

impl FileDataProvider for FailingProvider {
    fn get_file_data(&self, _start: u64, _len: u64) -> nx_core::Result<FileData> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Err(io::Error::other("disk on fire").into())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

/// Many repeated contents, some behind small random-looking delays, so
/// blocks holding the same bytes finish in a different order on each run.
fn duplicate_heavy_files() -> Vec<PackerFile> {
    let mut files = Vec::new();
    for index in 0..60usize {
        let data = patterned(12 * KIB, (index % 5) as u8);
        let path = format!("dup/{index:02}.bin");
        let file = if index % 2 == 1 {
            PackerFile::from_provider(
                path,
                Arc::new(SlowProvider {
                    data: Bytes::from(data),
                    delay: Duration::from_millis((index % 4) as u64 * 3),
                }),
            )
        } else {
            PackerFile::from_bytes(path, data)
        };
        files.push(file);
    }
    let large = patterned(SMALL_CHUNK as usize + 5 * KIB, 99);
    files.push(PackerFile::from_bytes("large/a.img", large.clone()));
    files.push(PackerFile::from_bytes("large/b.img", large));
    files
}

#[test]
fn duplicate_heavy_input_packs_identically_on_every_run() -> TestResult {
    let files = duplicate_heavy_files();
    let reference = pack_in_memory(files.clone(), small_settings(1))?;
    let expected = extract_all(&open_in_memory(reference.clone())?)?;

    for run in 0..4 {
        let archive = pack_in_memory(files.clone(), small_settings(8))?;
        assert!(archive == reference, "run {run} produced different archive bytes");
    }
    assert_eq!(expected.len(), 62);
    Ok(())
}

#[test]
fn slow_first_block_does_not_reorder_output() -> TestResult {
    // Each file fills its own block; the slow one is largest, so it is block 0.
    let slow_data = patterned(30 * KIB, 200);
    let slow = PackerFile::from_provider(
        "slow.dat",
        Arc::new(SlowProvider {
            data: Bytes::from(slow_data.clone()),
            delay: Duration::from_millis(150),
        }),
    );
    let mut files = vec![slow];
    for index in 0..24u8 {
        files.push(PackerFile::from_bytes(
            format!("fast/{index:02}.dat"),
            patterned(20 * KIB, index),
        ));
    }

    let archive = pack_in_memory(files, small_settings(16).with_deduplication(false))?;
    let unpacker = open_in_memory(archive)?;
    assert_eq!(unpacker.header().blocks.len(), 25);

    let entries = unpacker.file_entries();
    assert!(
        entries
            .windows(2)
            .all(|pair| pair[0].first_block_index <= pair[1].first_block_index),
        "entries were not added in block order"
    );
    let slow_entry = unpacker.find_entry("slow.dat").ok_or("slow.dat missing")?;
    assert_eq!(slow_entry.first_block_index, 0);

    // Each raw block must hold exactly the file its entry points at.
    let extracted = extract_all(&unpacker)?;
    for entry in entries {
        let path = unpacker.file_path(entry).ok_or("entry without path")?;
        let block = unpacker
            .source()
            .decompress_block(entry.first_block_index, entry.decompressed_size as usize)?;
        assert_eq!(block, extracted[path], "{path}");
    }
    assert_eq!(extracted["slow.dat"], slow_data);
    Ok(())
}

#[test]
fn many_threads_produce_the_single_thread_archive() -> TestResult {
    let build = || {
        (0..64u8)
            .map(|index| {
                let size = (index as usize % 9 + 1) * 5 * KIB;
                PackerFile::from_bytes(format!("mixed/{index:02}.bin"), patterned(size, index))
            })
            .collect::<Vec<_>>()
    };
    let reference = pack_in_memory(build(), small_settings(1))?;
    for threads in [2, 7, 32] {
        let archive = pack_in_memory(build(), small_settings(threads))?;
        assert!(archive == reference, "{threads} threads changed the archive");
    }
    Ok(())
}

#[test]
fn failing_input_reports_its_own_error() -> TestResult {
    let provider = Arc::new(FailingProvider {
        len: 4 * KIB as u64,
        reads: AtomicUsize::new(0),
    });
    let mut files = vec![PackerFile::from_provider(
        "broken.dat",
        Arc::clone(&provider) as Arc<dyn FileDataProvider>,
    )];
    for index in 0..40u8 {
        files.push(PackerFile::from_bytes(
            format!("fine/{index:02}.dat"),
            patterned(20 * KIB, index),
        ));
    }

    let started = Instant::now();
    let result = pack_in_memory(files, small_settings(8));
    let error = match result {
        Ok(_) => return Err("packing succeeded with a failing input".into()),
        Err(error) => error,
    };
    assert!(!error.is_cancellation(), "got {error}");
    assert!(error.to_string().contains("disk on fire"), "got {error}");
    assert!(provider.reads.load(Ordering::SeqCst) >= 1);
    assert!(started.elapsed() < Duration::from_secs(30));
    Ok(())
}

#[test]
fn cancelled_token_stops_packing() {
    let token = CancellationToken::new();
    token.cancel();
    let files = (0..10u8)
        .map(|index| PackerFile::from_bytes(format!("{index}.txt"), patterned(10 * KIB, index)))
        .collect();

    let result = pack_in_memory(files, small_settings(4).with_cancellation(token));
    match result {
        Err(error) => assert!(error.is_cancellation(), "got {error}"),
        Ok(_) => panic!("packing ignored cancellation"),
    }
}

#[test]
fn cancelling_mid_pack_unblocks_waiting_blocks() {
    let token = CancellationToken::new();
    let slow = PackerFile::from_provider(
        "slow.dat",
        Arc::new(SlowProvider {
            data: Bytes::from(patterned(30 * KIB, 1)),
            delay: Duration::from_millis(500),
        }),
    );
    let mut files = vec![slow];
    for index in 0..16u8 {
        files.push(PackerFile::from_bytes(format!("{index}.dat"), patterned(20 * KIB, index)));
    }

    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };
    let started = Instant::now();
    let result = pack_in_memory(files, small_settings(8).with_cancellation(token));
    let _ = canceller.join();

    assert!(matches!(result, Err(ref error) if error.is_cancellation()));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn cancelled_extraction_fails() -> TestResult {
    let files = (0..6u8)
        .map(|index| PackerFile::from_bytes(format!("{index}.dat"), patterned(20 * KIB, index)))
        .collect();
    let unpacker = open_in_memory(pack_in_memory(files, small_settings(2))?)?;

    let token = CancellationToken::new();
    token.cancel();
    let mut settings = nx_core::UnpackerSettings::default();
    settings.cancellation = Some(token);
    let entries = unpacker.file_entries().to_vec();
    let result = unpacker.extract_in_memory(&entries, settings);
    assert!(matches!(result, Err(ref error) if error.is_cancellation()));
    Ok(())
}

#[test]
fn failed_pack_leaves_the_callers_token_usable() -> TestResult {
    let token = CancellationToken::new();
    let broken = PackerFile::from_provider(
        "broken.dat",
        Arc::new(FailingProvider {
            len: 4 * KIB as u64,
            reads: AtomicUsize::new(0),
        }),
    );
    let mut files = vec![broken];
    for index in 0..12u8 {
        files.push(PackerFile::from_bytes(format!("{index}.dat"), patterned(20 * KIB, index)));
    }

    let result = pack_in_memory(files, small_settings(4).with_cancellation(token.clone()));
    assert!(matches!(result, Err(ref error) if !error.is_cancellation()));
    assert!(!token.is_cancelled(), "internal failure cancelled the caller's token");

    let files = (0..6u8)
        .map(|index| PackerFile::from_bytes(format!("{index}.dat"), patterned(20 * KIB, index)))
        .collect();
    let archive = pack_in_memory(files, small_settings(4).with_cancellation(token.clone()))?;
    let unpacker = open_in_memory(archive)?;
    assert_eq!(unpacker.file_entries().len(), 6);

    let mut settings = nx_core::UnpackerSettings::default();
    settings.cancellation = Some(token.clone());
    let entries = unpacker.file_entries().to_vec();
    let extracted = unpacker.extract_in_memory(&entries, settings)?;
    assert_eq!(extracted.len(), 6);
    assert!(!token.is_cancelled());
    Ok(())
}
