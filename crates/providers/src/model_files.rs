//! Model file selection for local inference.
//!
//! A GGUF repository usually ships one file per quantization. Only the
//! versions named in `model.gguf_versions` are downloaded: each version `v`
//! becomes the patterns `*v*.gguf` in lower and upper case.
//!
//! Once files are on disk, [`find_model_file`] walks the directory and picks
//! the first `.gguf` file, falling back to other weight formats.

use cpmagent_core::error::ProviderError;
use glob::Pattern;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Weight formats accepted when no `.gguf` file is present.
const FALLBACK_EXTENSIONS: &[&str] = &["bin", "pth", "pt", "onnx"];

/// Download patterns for the requested quantization versions.
///
/// A version that does not form a valid glob (e.g. an unclosed `[`) is a
/// configuration error.
pub fn allow_patterns(versions: &[String]) -> Result<Vec<Pattern>, ProviderError> {
    let mut patterns: Vec<Pattern> = Vec::with_capacity(versions.len() * 2);
    for version in versions {
        for text in [
            format!("*{}*.gguf", version.to_lowercase()),
            format!("*{}*.gguf", version.to_uppercase()),
        ] {
            let pattern = Pattern::new(&text).map_err(|e| {
                ProviderError::NotConfigured(format!("Invalid GGUF version '{version}': {e}"))
            })?;
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
    }
    Ok(patterns)
}

/// Whether a repository file name matches any of `patterns`.
pub fn matches_any(file_name: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|p| p.matches(file_name))
}

/// Find a model file under `dir`: the first `.gguf` file in path order,
/// otherwise the first file with a fallback weight extension.
pub fn find_model_file(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(error = %e, "Skipping unreadable model directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let has_ext = |p: &Path, ext: &str| {
        p.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    };

    files
        .iter()
        .find(|p| has_ext(p, "gguf"))
        .or_else(|| {
            files
                .iter()
                .find(|p| FALLBACK_EXTENSIONS.iter().any(|ext| has_ext(p, ext)))
        })
        .cloned()
}

/// Resolve an explicit model path: a file is used as-is, a directory is searched.
pub fn resolve_local_path(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        Some(path.to_path_buf())
    } else if path.is_dir() {
        find_model_file(path)
    } else {
        None
    }
}
