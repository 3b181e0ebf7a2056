//! Relative path handling.
//!
//! Relative paths travel between hosts as `/`-separated strings with the root
//! itself spelled `""`, whatever the local separator is.

use std::path::{Component, Path, PathBuf};

use crate::error::ReplicaError;

/// Express `path` relative to `root` in wire form.
pub fn relative_path(root: &Path, path: &Path) -> Result<String, ReplicaError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| ReplicaError::PathOutsideRoot {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })?;

    let mut segments = Vec::new();
    for component in rel.components() {
        if let Component::Normal(segment) = component {
            let segment = segment.to_str().ok_or_else(|| ReplicaError::NonUtf8Path {
                path: path.to_path_buf(),
            })?;
            segments.push(segment);
        }
    }
    Ok(segments.join("/"))
}

/// Resolve a wire-form relative path against a local root.
pub fn absolute_path(root: &Path, relative: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

/// Join a child name onto a relative directory.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Whether `path` is `ancestor` or lies beneath it, compared by whole segments
/// so `"ab"` is not inside `"a"`.
pub fn is_within(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Reject relative paths that could resolve outside the root.
pub fn validate_relative(relative: &str) -> Result<(), ReplicaError> {
    let invalid = |reason| ReplicaError::InvalidRelativePath {
        path: relative.to_string(),
        reason,
    };

    if relative.is_empty() {
        return Ok(());
    }
    if relative.starts_with('/') || Path::new(relative).is_absolute() {
        return Err(invalid("absolute paths are not allowed"));
    }
    for segment in relative.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("dot segments are not allowed")),
            s if s.contains('\\') => return Err(invalid("backslash in path segment")),
            _ => {}
        }
    }
    Ok(())
}
