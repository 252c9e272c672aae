//! File discovery and scanning

use crate::error::{Result, StemflowError};
use crate::types::AudioFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// List the audio files directly inside a directory
///
/// Only regular files with a supported extension are returned, sorted by
/// file name. Subdirectories are not descended into.
pub fn scan(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(StemflowError::FileNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(StemflowError::InvalidInput(format!(
            "Expected a directory of audio files: {}",
            dir.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_audio_file(path) {
            debug!("Discovered: {}", path.display());
            files.push(path.to_path_buf());
        }
    }

    info!("Discovered {} audio files in {}", files.len(), dir.display());

    if files.is_empty() {
        warn!("No supported audio files found in {}", dir.display());
    }

    Ok(files)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(AudioFormat::from_extension)
        .is_some()
}

/// Resolve a path to an absolute, symlink-free form for identity checks
///
/// Falls back to joining with the current directory when the path cannot be
/// canonicalized (e.g. it does not exist).
pub fn resolve(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_extensions_and_depth() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.wav"), b"x").unwrap();
        std::fs::write(dir.path().join("a.MP3"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.flac"), b"x").unwrap();

        let files = scan(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![dir.path().join("a.MP3"), dir.path().join("b.wav")]
        );
    }

    #[test]
    fn test_scan_rejects_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.wav");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(scan(&file), Err(StemflowError::InvalidInput(_))));
    }

    #[test]
    fn test_scan_missing_dir() {
        let err = scan(Path::new("/no/such/dir/anywhere")).unwrap_err();
        assert!(matches!(err, StemflowError::FileNotFound(_)));
    }

    #[test]
    fn test_resolve_same_file_different_spelling() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("x.wav");
        std::fs::write(&file, b"x").unwrap();
        let dotted = dir.path().join(".").join("x.wav");
        assert_eq!(resolve(&file), resolve(&dotted));
    }
}
