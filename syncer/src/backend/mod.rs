//! Storage backends.
//!
//! A Location talks to its storage through exactly one capability
//! interface, [`StorageBackend`]. The set of backends is closed: a local
//! directory tree or an object-store bucket prefix.

pub mod fs;
#[cfg(test)]
pub(crate) mod memory;
pub mod object_store;
pub mod s3;

use crate::manifest::{ObjectBody, ObjectDescriptor};
use crate::utils::errors::Result;
use async_trait::async_trait;
use std::fmt;

pub use fs::FsBackend;
pub use object_store::{ObjectStoreBackend, ObjectStoreClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Filesystem,
    ObjectStore,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Filesystem => write!(f, "filesystem"),
            BackendKind::ObjectStore => write!(f, "object-store"),
        }
    }
}

/// list / put / delete under one root.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Human-readable root, used in logs and errors.
    fn root(&self) -> String;

    /// Enumerate every object under the root. Pagination is fully drained.
    async fn list(&self) -> Result<Vec<ObjectDescriptor>>;

    /// Write `body` at `key`, returning the descriptor of the written object.
    async fn put(&self, key: &str, body: ObjectBody) -> Result<ObjectDescriptor>;

    /// Remove `key`. A missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

pub enum Backend {
    Filesystem(FsBackend),
    ObjectStore(ObjectStoreBackend),
}

impl Backend {
    pub fn storage(&self) -> &dyn StorageBackend {
        match self {
            Backend::Filesystem(backend) => backend,
            Backend::ObjectStore(backend) => backend,
        }
    }

    pub fn as_filesystem(&self) -> Option<&FsBackend> {
        match self {
            Backend::Filesystem(backend) => Some(backend),
            Backend::ObjectStore(_) => None,
        }
    }
}
