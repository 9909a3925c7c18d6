#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::thread;

    use nx_core::io::{FileDataProvider, FromArrayProvider};
    use nx_core::pack::{FromLazyBlockProvider, LazyDecompressedBlock};
    use nx_core::telemetry::{self, tags};
    use nx_core::{
        BufferPool, NxPacker, NxSource, NxUnpacker, PackerFile, PackerSettings, UnpackerSettings,
    };

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state as u8
            })
            .collect()
    }

    #[test]
    fn packing_and_extraction_record_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let shared = vec![b'a'; 4096];
        let files = vec![
            PackerFile::from_bytes("one.txt", shared.clone()),
            PackerFile::from_bytes("two.txt", shared),
            PackerFile::from_bytes("noise.bin", noise(8192)),
        ];
        let settings = PackerSettings::default().with_max_threads(2);
        let archive = NxPacker::pack(files, settings, Cursor::new(Vec::new()))?.into_inner();

        let unpacker = NxUnpacker::open(Arc::new(FromArrayProvider::new(archive)))?;
        let entries = unpacker.file_entries().to_vec();
        unpacker.extract_in_memory(&entries, UnpackerSettings::default())?;

        let snapshot = telemetry::snapshot();
        let blocks = unpacker.header().blocks.len() as u64;
        assert_eq!(snapshot.counter(tags::METRIC_BLOCK_WRITE_COUNT), Some(blocks));
        assert!(snapshot.counter(tags::METRIC_BLOCK_WRITE_BYTES).unwrap_or(0) > 0);
        assert_eq!(snapshot.counter(tags::METRIC_DEDUP_SOLID_HIT_COUNT), Some(1));
        assert!(snapshot.counter(tags::METRIC_COMPRESSION_COPY_FALLBACK_COUNT).unwrap_or(0) >= 1);
        assert!(snapshot.counter(tags::METRIC_COMPRESSION_APPLY_COUNT).unwrap_or(0) >= 1);
        assert_eq!(snapshot.counter(tags::METRIC_BLOCK_EXTRACT_COUNT), Some(blocks));

        let string_pool = snapshot
            .histogram(tags::METRIC_STRING_POOL_PACK_LATENCY_US)
            .ok_or("string pool latency missing")?;
        assert_eq!(string_pool.count, 1);
        let tasks = snapshot
            .histogram(tags::METRIC_WORKER_TASK_LATENCY_US)
            .ok_or("worker latency missing")?;
        assert!(tasks.count >= blocks);
        assert!(tasks.min <= tasks.max);
        Ok(())
    }

    #[test]
    fn buffer_pool_counters_follow_reuse() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let pool = BufferPool::new(64, 1);
        {
            let _first = pool.acquire();
            let _second = pool.acquire();
        }
        {
            let _third = pool.acquire();
        }

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_CREATED_COUNT), Some(2));
        assert_eq!(snapshot.counter(tags::METRIC_BUFFER_ACQUIRE_RECYCLED_COUNT), Some(1));
        assert!(snapshot.counter(tags::METRIC_BUFFER_RECYCLE_DROPPED_COUNT).unwrap_or(0) >= 1);
    }

    #[test]
    fn lazy_block_decompresses_once_for_concurrent_readers()
    -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");

        let files = (0..6)
            .map(|index| PackerFile::from_bytes(format!("{index}.txt"), vec![b'a' + index; 700]))
            .collect();
        let settings = PackerSettings::default().with_max_threads(1);
        let archive = NxPacker::pack(files, settings, Cursor::new(Vec::new()))?.into_inner();
        let source = Arc::new(NxSource::open(Arc::new(FromArrayProvider::new(archive)))?);
        let entries = source.header().entries.clone();
        let block = Arc::new(LazyDecompressedBlock::new(
            Arc::clone(&source),
            entries[0].first_block_index,
            6 * 700,
        ));

        telemetry::reset();
        let readers: Vec<_> = entries
            .iter()
            .map(|entry| {
                let provider = FromLazyBlockProvider::new(
                    Arc::clone(&block),
                    entry.decompressed_block_offset as u64,
                    entry.decompressed_size,
                );
                thread::spawn(move || provider.get_file_data(0, 700).map(|data| data.to_vec()))
            })
            .collect();
        for reader in readers {
            let data = reader.join().map_err(|_| "reader panicked")??;
            assert_eq!(data.len(), 700);
        }

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_LAZY_BLOCK_DECOMPRESS_COUNT), Some(1));
        Ok(())
    }

    #[test]
    fn reset_clears_everything() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::increment_counter(tags::METRIC_BLOCK_WRITE_COUNT, 3);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, 10);
        telemetry::reset();

        let snapshot = telemetry::snapshot();
        assert!(snapshot.counters.is_empty());
        assert!(snapshot.histograms.is_empty());
    }
}
