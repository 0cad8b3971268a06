//! Path validation for file tools.
//!
//! A path is accepted when it contains no `..` components, does not fall
//! under a forbidden prefix, and lies inside one of the allowed roots.
//! Comparison happens on the canonical (symlink-resolved) path.

use std::path::{Path, PathBuf};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside allowed roots")]
    OutsideAllowedRoots { path: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// Validate that a path is safe to read.
///
/// An empty `allowed_roots` allows any path not forbidden.
/// Returns the canonical path on success.
pub fn validate_path(
    path: &str,
    allowed_roots: &[String],
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let input_path = Path::new(path);

    if input_path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    let canonical = if input_path.exists() {
        input_path
            .canonicalize()
            .map_err(|e| PathValidationError::CanonicalizeFailed {
                path: path.into(),
                reason: e.to_string(),
            })?
    } else {
        // Nothing to resolve; the read will fail on its own.
        input_path.to_path_buf()
    };

    let canonical_str = normalize(&canonical.to_string_lossy());

    for forbidden in forbidden_paths {
        if has_prefix(&canonical_str, &normalize(&expand_tilde(forbidden))) {
            return Err(PathValidationError::ForbiddenPath {
                path: path.into(),
                pattern: forbidden.clone(),
            });
        }
    }

    if !allowed_roots.is_empty() {
        let is_allowed = allowed_roots.iter().any(|root| {
            let root = expand_tilde(root);
            // Roots are canonicalized too, so symlinked workspaces still match.
            let root = Path::new(&root)
                .canonicalize()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or(root);
            has_prefix(&canonical_str, &normalize(&root))
        });

        if !is_allowed {
            return Err(PathValidationError::OutsideAllowedRoots { path: path.into() });
        }
    }

    Ok(canonical)
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_end_matches('/').to_lowercase()
}

/// Component-wise prefix check: `/etc` covers `/etc/passwd` but not `/etcetera`.
fn has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Ok(home) = std::env::var("HOME")
    {
        return path.replacen('~', &home, 1);
    }
    path.to_string()
}
