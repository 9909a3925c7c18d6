use std::fs;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::types::Result;
use crate::NxError;

/// A regular file found under a packing root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the root, `/` separated.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// Lists every regular file below `root`, sorted by relative path.
///
/// Directories contribute nothing of their own; empty directories are not
/// represented in an archive.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    if !root.is_dir() {
        return Err(NxError::InvalidFormat("pack source is not a directory"));
    }

    let mut file_paths = Vec::<PathBuf>::new();
    for entry in WalkDir::new(root).sort(true) {
        let entry = entry.map_err(anyhow::Error::from)?;
        let path = entry.path();
        if path == root || entry.file_type().is_dir() {
            continue;
        }
        if !entry.file_type().is_file() {
            tracing::debug!(path = %path.display(), "skipping non-regular file");
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .map_err(|_| NxError::InvalidFormat("invalid relative path"))?
            .to_path_buf();
        file_paths.push(relative);
    }
    file_paths.sort();

    let mut files = Vec::with_capacity(file_paths.len());
    for relative in file_paths {
        let relative_path = relative_path_to_utf8(&relative)?;
        let full_path = root.join(&relative);
        let size = fs::metadata(&full_path)?.len();
        files.push(DiscoveredFile {
            relative_path,
            full_path,
            size,
        });
    }
    Ok(files)
}

fn relative_path_to_utf8(path: &Path) -> Result<String> {
    let raw = path
        .to_str()
        .ok_or(NxError::InvalidFormat("non-utf8 path not supported"))?;
    Ok(raw.replace('\\', "/"))
}
