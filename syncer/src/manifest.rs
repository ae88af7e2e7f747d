//! Manifest types for a single Location.
//!
//! A manifest maps every relative key under a Location's root to the
//! descriptor of the object stored there. It is rebuilt from a full listing
//! at startup and then mutated in place as puts, deletes and watch events
//! are applied. Nothing here is persisted.

use crate::backend::object_store::{ListedObject, ObjectStoreClient};
use crate::utils::errors::{Result, SyncError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Backend-specific reference sufficient to read an object's content.
#[derive(Clone)]
pub enum BackendHandle {
    /// Absolute path of a regular file.
    File { path: PathBuf },

    /// Full object key in the bucket served by `client`.
    Object {
        client: Arc<dyn ObjectStoreClient>,
        key: String,
    },
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendHandle::File { path } => f.debug_struct("File").field("path", path).finish(),
            BackendHandle::Object { client, key } => f
                .debug_struct("Object")
                .field("bucket", &client.bucket())
                .field("key", key)
                .finish(),
        }
    }
}

/// Readable content of one object, ready to be written to a backend.
#[derive(Debug, Clone)]
pub enum ObjectBody {
    /// Content still on disk; writers stream it from `path`.
    File { path: PathBuf, size: u64 },

    /// Content already pulled into memory.
    Bytes(Bytes),
}

impl ObjectBody {
    pub fn len(&self) -> u64 {
        match self {
            ObjectBody::File { size, .. } => *size,
            ObjectBody::Bytes(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the whole body into memory.
    pub async fn into_bytes(self) -> std::io::Result<Bytes> {
        match self {
            ObjectBody::File { path, .. } => Ok(Bytes::from(tokio::fs::read(&path).await?)),
            ObjectBody::Bytes(bytes) => Ok(bytes),
        }
    }
}

/// Normalized metadata for one object.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    /// Relative key, `/`-separated, no leading separator
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Backend-local timestamp; only comparable with the same backend kind
    pub last_modified: DateTime<Utc>,

    pub handle: BackendHandle,
}

impl ObjectDescriptor {
    /// Describe a regular file from its on-disk metadata.
    pub fn from_file(key: String, path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let last_modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_default();

        Self {
            key,
            size: metadata.len(),
            last_modified,
            handle: BackendHandle::File { path },
        }
    }

    /// Describe an object returned by a bucket listing.
    pub fn from_listed(key: String, object: ListedObject, client: Arc<dyn ObjectStoreClient>) -> Self {
        Self {
            key,
            size: object.size,
            last_modified: object.last_modified,
            handle: BackendHandle::Object {
                client,
                key: object.key,
            },
        }
    }

    /// Open the content referenced by this descriptor.
    pub async fn open(&self) -> Result<ObjectBody> {
        match &self.handle {
            BackendHandle::File { path } => Ok(ObjectBody::File {
                path: path.clone(),
                size: self.size,
            }),
            BackendHandle::Object { client, key } => client
                .get_object(key)
                .await
                .map(ObjectBody::Bytes)
                .map_err(|e| SyncError::backend("read", &self.key, e)),
        }
    }
}

/// Mapping from relative key to descriptor for one Location.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: BTreeMap<String, ObjectDescriptor>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `descriptor.key`.
    pub fn insert(&mut self, descriptor: ObjectDescriptor) -> Option<ObjectDescriptor> {
        self.entries.insert(descriptor.key.clone(), descriptor)
    }

    pub fn remove(&mut self, key: &str) -> Option<ObjectDescriptor> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&ObjectDescriptor> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectDescriptor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys strictly below `dir`, as if `dir` were a directory.
    pub fn keys_under(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|d| d.size).sum()
    }
}

impl FromIterator<ObjectDescriptor> for Manifest {
    fn from_iter<I: IntoIterator<Item = ObjectDescriptor>>(iter: I) -> Self {
        let mut manifest = Manifest::new();
        for descriptor in iter {
            manifest.insert(descriptor);
        }
        manifest
    }
}
