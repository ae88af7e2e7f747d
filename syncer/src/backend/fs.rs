//! Hierarchical filesystem backend.
//!
//! Only regular files become manifest entries; directories exist implicitly
//! through the keys of the files beneath them.

use super::{BackendKind, StorageBackend};
use crate::fs::walker::{walk_files, WalkOptions};
use crate::location::key;
use crate::manifest::{ObjectBody, ObjectDescriptor};
use crate::utils::errors::{Result, SyncError};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A local directory tree endpoint.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
    walk_options: WalkOptions,
}

impl FsBackend {
    /// The root must be an existing directory. It is canonicalized so that
    /// watch notifications and listings agree on the path prefix.
    pub fn new(root: impl Into<PathBuf>, walk_options: WalkOptions) -> Result<Self> {
        let root = root.into();
        let listing_error = |e: std::io::Error| SyncError::Listing {
            root: root.display().to_string(),
            message: e.to_string(),
        };
        let metadata = std::fs::metadata(&root).map_err(listing_error)?;

        if !metadata.is_dir() {
            return Err(SyncError::InvalidLocation(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let root = std::fs::canonicalize(&root).map_err(listing_error)?;
        Ok(Self { root, walk_options })
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn walk_options(&self) -> &WalkOptions {
        &self.walk_options
    }

    /// Key of an absolute path under this root.
    pub fn key_for(&self, path: &Path) -> Option<String> {
        key::key_from_path(&self.root, path)
    }

    /// Path of `relative` under this root. Keys that would climb out of the
    /// root are refused.
    pub fn path_for(&self, op: &'static str, relative: &str) -> Result<PathBuf> {
        key::path_for_key(&self.root, relative)
            .ok_or_else(|| SyncError::backend(op, relative, "key escapes the location root"))
    }

    /// Describe the current on-disk state of `path`.
    ///
    /// Returns `Ok(None)` when the path vanished or is not a regular file.
    pub fn describe(&self, relative: &str, path: &Path) -> Result<Option<ObjectDescriptor>> {
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => Ok(Some(ObjectDescriptor::from_file(
                relative.to_string(),
                path.to_path_buf(),
                &metadata,
            ))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::backend("read", relative, e)),
        }
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn root(&self) -> String {
        self.root.display().to_string()
    }

    async fn list(&self) -> Result<Vec<ObjectDescriptor>> {
        let root = self.root.clone();
        let options = self.walk_options.clone();

        // Directory walk is blocking I/O
        let files = tokio::task::spawn_blocking(move || walk_files(&root, &options))
            .await
            .map_err(|e| SyncError::Listing {
                root: self.root(),
                message: e.to_string(),
            })?
            .map_err(|e| SyncError::Listing {
                root: self.root(),
                message: e.to_string(),
            })?;

        let descriptors: Vec<ObjectDescriptor> = files
            .into_iter()
            .filter_map(|file| {
                if file.is_symlink {
                    debug!("Following symlink {}", file.path.display());
                }
                let relative = key::key_from_relative(&file.relative_path)?;
                Some(ObjectDescriptor::from_file(relative, file.path, &file.metadata))
            })
            .collect();

        debug!("Listed {} files under {}", descriptors.len(), self.root.display());
        Ok(descriptors)
    }

    async fn put(&self, relative: &str, body: ObjectBody) -> Result<ObjectDescriptor> {
        let target = self.path_for("put", relative)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::backend("put", relative, e))?;
        }

        match body {
            ObjectBody::File { path, .. } => {
                tokio::fs::copy(&path, &target)
                    .await
                    .map_err(|e| SyncError::backend("put", relative, e))?;
            }
            ObjectBody::Bytes(bytes) => {
                tokio::fs::write(&target, &bytes)
                    .await
                    .map_err(|e| SyncError::backend("put", relative, e))?;
            }
        }

        let metadata = tokio::fs::metadata(&target)
            .await
            .map_err(|e| SyncError::backend("put", relative, e))?;

        Ok(ObjectDescriptor::from_file(relative.to_string(), target, &metadata))
    }

    async fn delete(&self, relative: &str) -> Result<()> {
        let target = self.path_for("delete", relative)?;

        let metadata = match tokio::fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(SyncError::backend("delete", relative, e)),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };

        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::backend("delete", relative, e)),
        }
    }
}
