use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use nx_core::io::discover_files;
use nx_core::{
    CompressionPreference, NxPacker, NxUnpacker, PackerFile, PackerSettings, ProgressSnapshot,
    UnpackerSettings,
};
use tracing_subscriber::EnvFilter;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(
    name = "nx",
    version,
    about = "Nexus archive CLI",
    long_about = "Pack, extract and inspect .nx archives."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory (or a single file) into an .nx archive.
    Pack {
        /// Directory or file to pack.
        #[arg(long)]
        source: PathBuf,

        /// Archive to create.
        #[arg(long)]
        target: PathBuf,

        /// SOLID block size (supports suffixes K/M, e.g. 256K). Rounded to 2^n - 1.
        #[arg(long, default_value = "1M", value_parser = parse_size)]
        blocksize: u32,

        /// Chunk size for large files (supports suffixes K/M). Rounded to a power of two.
        #[arg(long, default_value = "1M", value_parser = parse_size)]
        chunksize: u32,

        #[arg(long, default_value_t = nx_core::pack::settings::DEFAULT_ZSTANDARD_LEVEL)]
        zstandardlevel: i32,

        #[arg(long, default_value_t = nx_core::pack::settings::DEFAULT_LZ4_LEVEL)]
        lz4level: i32,

        /// Codec for SOLID blocks.
        #[arg(long, value_enum, default_value_t = AlgorithmArg::Zstandard)]
        solid_algorithm: AlgorithmArg,

        /// Codec for chunks of large files.
        #[arg(long, value_enum, default_value_t = AlgorithmArg::Zstandard)]
        chunked_algorithm: AlgorithmArg,

        /// Number of worker threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,

        /// Store identical files and chunks more than once.
        #[arg(long, default_value_t = false)]
        no_dedup: bool,
    },
    /// Extract every file of an archive into a directory.
    Extract {
        /// Archive to read.
        #[arg(long)]
        source: PathBuf,

        /// Directory to extract into.
        #[arg(long)]
        target: PathBuf,

        /// Number of decode worker threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        threads: usize,

        /// Re-hash extracted files and fail on a mismatch.
        #[arg(long, default_value_t = false)]
        verify: bool,
    },
    /// Print the files stored in an archive.
    List {
        #[arg(long)]
        source: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Copy,
    Zstandard,
    Lz4,
}

impl From<AlgorithmArg> for CompressionPreference {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Copy => CompressionPreference::Copy,
            AlgorithmArg::Zstandard => CompressionPreference::Zstandard,
            AlgorithmArg::Lz4 => CompressionPreference::Lz4,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Pack {
            source,
            target,
            blocksize,
            chunksize,
            zstandardlevel,
            lz4level,
            solid_algorithm,
            chunked_algorithm,
            threads,
            no_dedup,
        } => {
            let mut settings = PackerSettings::default()
                .with_block_size(blocksize)
                .with_chunk_size(chunksize)
                .with_max_threads(threads)
                .with_deduplication(!no_dedup);
            settings.zstandard_level = zstandardlevel;
            settings.lz4_level = lz4level;
            settings.solid_compression = solid_algorithm.into();
            settings.chunked_compression = chunked_algorithm.into();
            pack_command(&source, &target, settings)?
        }
        Commands::Extract {
            source,
            target,
            threads,
            verify,
        } => extract_command(
            &source,
            &target,
            UnpackerSettings::default()
                .with_max_threads(threads)
                .with_verify_hashes(verify),
        )?,
        Commands::List { source } => list_command(&source)?,
    }

    Ok(())
}

fn pack_command(
    source: &Path,
    target: &Path,
    settings: PackerSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let discovery_started = Instant::now();
    eprintln!("discovering input...");
    let files = collect_files(source)?;
    let input_bytes: u64 = files.iter().map(PackerFile::size).sum();
    eprintln!(
        "found {} files ({}) in {}",
        files.len(),
        format_bytes(input_bytes),
        format_duration(discovery_started.elapsed())
    );

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let started = Instant::now();
    let last_report = Arc::new(Mutex::new(None::<Instant>));
    let settings = settings.with_progress(Arc::new(move |snapshot: ProgressSnapshot| {
        let Ok(mut last) = last_report.lock() else {
            return;
        };
        let finished = snapshot.blocks_done == snapshot.blocks_total;
        if !finished && last.is_some_and(|at| at.elapsed() < PROGRESS_INTERVAL) {
            return;
        }
        *last = Some(Instant::now());

        let elapsed = started.elapsed();
        let rate = snapshot.bytes_written as f64 / elapsed.as_secs_f64().max(1e-6);
        let mut stderr = io::stderr().lock();
        let _ = write!(
            stderr,
            "\r{:>6.2}% | blocks {}/{} | written {} | {} | {}/s",
            snapshot.fraction() * 100.0,
            snapshot.blocks_done,
            snapshot.blocks_total,
            format_bytes(snapshot.bytes_written),
            format_duration(elapsed),
            format_rate(rate),
        );
        let _ = stderr.flush();
    }));

    let file_count = files.len();
    NxPacker::pack_to_path(files, settings, target)?;
    eprintln!();

    let archive_bytes = std::fs::metadata(target)?.len();
    let elapsed = started.elapsed();
    println!("packed {} -> {}", source.display(), target.display());
    println!("  files: {file_count}");
    println!(
        "  size: {} -> {} ({:.2}%)",
        format_bytes(input_bytes),
        format_bytes(archive_bytes),
        ratio_percent(archive_bytes, input_bytes)
    );
    println!(
        "  time: {} ({}/s)",
        format_duration(elapsed),
        format_rate(input_bytes as f64 / elapsed.as_secs_f64().max(1e-6))
    );
    Ok(())
}

fn collect_files(source: &Path) -> Result<Vec<PackerFile>, Box<dyn std::error::Error>> {
    if source.is_file() {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or("source file name is not valid UTF-8")?;
        return Ok(vec![PackerFile::from_path(name, source)?]);
    }

    let mut files = Vec::new();
    for found in discover_files(source)? {
        files.push(PackerFile::from_path(found.relative_path, found.full_path)?);
    }
    Ok(files)
}

fn extract_command(
    source: &Path,
    target: &Path,
    settings: UnpackerSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let started = Instant::now();
    let unpacker = NxUnpacker::open_path(source)?;
    let entries = unpacker.file_entries().to_vec();
    let total: u64 = entries.iter().map(|entry| entry.decompressed_size).sum();
    let verify = settings.verify_hashes;

    std::fs::create_dir_all(target)?;
    let written = unpacker.extract_to_directory(&entries, target, settings)?;

    let elapsed = started.elapsed();
    println!("extracted {} -> {}", source.display(), target.display());
    println!("  files: {}", written.len());
    println!("  size: {}", format_bytes(total));
    if verify {
        println!("  hashes: verified");
    }
    println!(
        "  time: {} ({}/s)",
        format_duration(elapsed),
        format_rate(total as f64 / elapsed.as_secs_f64().max(1e-6))
    );
    Ok(())
}

fn list_command(source: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let listing = NxUnpacker::open_path(source)?.listing();

    println!(
        "{:>12}  {:<5}  {:>7}  {:>9}  {:>6}  {:<16}  path",
        "size", "codec", "block", "offset", "chunks", "hash"
    );
    for file in &listing.files {
        println!(
            "{:>12}  {:<5}  {:>7}  {:>9}  {:>6}  {:016x}  {}",
            file.size,
            file.compression.name(),
            file.first_block_index,
            file.block_offset,
            file.chunk_count,
            file.hash,
            file.path
        );
    }

    let total = listing.total_size();
    println!();
    println!(
        "{} files, {} blocks ({:?}), block size {}, chunk size {}",
        listing.files.len(),
        listing.block_count,
        listing.toc_version,
        format_bytes(listing.block_size as u64),
        format_bytes(listing.chunk_size as u64)
    );
    println!(
        "{} stored as {} ({:.2}%)",
        format_bytes(total),
        format_bytes(listing.compressed_bytes),
        ratio_percent(listing.compressed_bytes, total)
    );
    Ok(())
}

fn ratio_percent(stored: u64, original: u64) -> f64 {
    if original == 0 {
        0.0
    } else {
        stored as f64 / original as f64 * 100.0
    }
}

fn parse_size(value: &str) -> Result<u32, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size cannot be empty".to_string());
    }

    let split_at = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (num_part, suffix_part) = trimmed.split_at(split_at);
    if num_part.is_empty() {
        return Err(format!("invalid size: {value}"));
    }

    let base: u32 = num_part
        .parse()
        .map_err(|_| format!("invalid size number: {value}"))?;

    let multiplier = match suffix_part.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1u32,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        other => {
            return Err(format!("invalid size suffix '{other}' in '{value}'"));
        }
    };

    base.checked_mul(multiplier)
        .ok_or_else(|| format!("size overflow: {value}"))
}

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    if !bytes_per_second.is_finite() || bytes_per_second <= 0.0 {
        return "0 B".to_string();
    }
    format_bytes(bytes_per_second as u64)
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
