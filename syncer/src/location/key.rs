//! Key normalization.
//!
//! Every manifest key is a `/`-separated path relative to its Location's
//! root, with no leading or trailing separator, no empty or `.` segments
//! and no `..` segments. Both backends derive keys through this module so that the
//! same string names the same logical object on either side of a pair.

use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Canonical key separator.
pub const SEPARATOR: char = '/';

/// Clean a raw key: drop empty and `.` segments and surrounding separators.
pub fn normalize_key(raw: &str) -> String {
    raw.split(SEPARATOR)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// True when a `..` segment would climb out of the Location's root.
pub fn escapes_root(raw: &str) -> bool {
    raw.split(SEPARATOR).any(|segment| segment == "..")
}

/// Derive the key of `path` relative to a filesystem `root`.
///
/// Returns `None` for the root itself and for paths outside of it.
pub fn key_from_path(root: &Path, path: &Path) -> Option<String> {
    key_from_relative(path.strip_prefix(root).ok()?)
}

/// Key of a path that is already relative to its root.
pub fn key_from_relative(relative: &Path) -> Option<String> {
    let mut segments = Vec::new();

    for component in relative.components() {
        match component {
            Component::Normal(name) => segments.push(name.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Filesystem path of `key` under `root`, or `None` if the key would escape it.
pub fn path_for_key(root: &Path, key: &str) -> Option<PathBuf> {
    if escapes_root(key) {
        return None;
    }
    let path = key
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .fold(root.to_path_buf(), |path, segment| path.join(segment));
    Some(path)
}

/// Listing prefix for a bucket prefix: normalized, with a trailing
/// separator unless empty, so `photos` never matches `photos2/...`.
pub fn object_prefix(prefix: &str) -> String {
    let prefix = normalize_key(prefix);
    if prefix.is_empty() {
        prefix
    } else {
        format!("{}/", prefix)
    }
}

/// Full object name of `key` under a bucket prefix.
pub fn object_key(prefix: &str, key: &str) -> String {
    format!("{}{}", object_prefix(prefix), normalize_key(key))
}

/// Derive the key of a full object name relative to a bucket prefix.
pub fn key_from_object(prefix: &str, object_key: &str) -> Option<String> {
    let relative = object_key.strip_prefix(&object_prefix(prefix))?;
    if escapes_root(relative) {
        warn!("Skipping object {} with a parent-directory segment", object_key);
        return None;
    }
    let key = normalize_key(relative);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}
