//! Flat-namespace object-store backend.
//!
//! The bucket itself is reached through an [`ObjectStoreClient`], the narrow
//! list/get/put/delete contract a concrete SDK client implements. Keys are
//! mapped onto object names by prefixing the Location's bucket prefix.

use super::{BackendKind, StorageBackend};
use crate::location::key;
use crate::manifest::{BackendHandle, ObjectBody, ObjectDescriptor};
use crate::utils::errors::{Result, SyncError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Error type returned by object-store clients.
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// One object as reported by a bucket listing.
#[derive(Debug, Clone)]
pub struct ListedObject {
    /// Full object name, including the prefix
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,

    /// Token for the next page; `None` once the listing is drained
    pub next: Option<String>,
}

/// Object-store client contract.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Bucket this client operates on.
    fn bucket(&self) -> &str;

    /// List one page of objects whose names start with `prefix`.
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> std::result::Result<ListPage, ClientError>;

    async fn get_object(&self, key: &str) -> std::result::Result<Bytes, ClientError>;

    async fn put_object(&self, key: &str, body: ObjectBody) -> std::result::Result<(), ClientError>;

    /// Deleting a missing object must succeed.
    async fn delete_object(&self, key: &str) -> std::result::Result<(), ClientError>;
}

/// A bucket + prefix endpoint.
pub struct ObjectStoreBackend {
    client: Arc<dyn ObjectStoreClient>,
    prefix: String,
}

impl ObjectStoreBackend {
    pub fn new(client: Arc<dyn ObjectStoreClient>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: key::normalize_key(&prefix.into()),
        }
    }

    pub fn bucket(&self) -> &str {
        self.client.bucket()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    fn root(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket())
        } else {
            format!("s3://{}/{}", self.bucket(), self.prefix)
        }
    }

    async fn list(&self) -> Result<Vec<ObjectDescriptor>> {
        let prefix = key::object_prefix(&self.prefix);
        let mut descriptors = Vec::new();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_page(&prefix, continuation.take())
                .await
                .map_err(|e| SyncError::Listing {
                    root: self.root(),
                    message: e.to_string(),
                })?;
            pages += 1;

            for object in page.objects {
                // Zero-byte "folder" placeholders carry no content
                if object.key.ends_with('/') {
                    continue;
                }
                if let Some(relative) = key::key_from_object(&self.prefix, &object.key) {
                    descriptors.push(ObjectDescriptor::from_listed(
                        relative,
                        object,
                        Arc::clone(&self.client),
                    ));
                }
            }

            match page.next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!("Listed {} objects from {} in {} page(s)", descriptors.len(), self.root(), pages);
        Ok(descriptors)
    }

    async fn put(&self, relative: &str, body: ObjectBody) -> Result<ObjectDescriptor> {
        let object_key = key::object_key(&self.prefix, relative);
        let size = body.len();

        self.client
            .put_object(&object_key, body)
            .await
            .map_err(|e| SyncError::backend("put", relative, e))?;

        Ok(ObjectDescriptor {
            key: relative.to_string(),
            size,
            last_modified: Utc::now(),
            handle: BackendHandle::Object {
                client: Arc::clone(&self.client),
                key: object_key,
            },
        })
    }

    async fn delete(&self, relative: &str) -> Result<()> {
        let object_key = key::object_key(&self.prefix, relative);

        self.client
            .delete_object(&object_key)
            .await
            .map_err(|e| SyncError::backend("delete", relative, e))
    }
}
