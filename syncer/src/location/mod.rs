//! Locations: the two endpoints of a sync pair.
//!
//! A Location wraps one backend, owns the in-memory manifest for its root and
//! funnels every put/delete through one place so that the backend and the
//! manifest never drift apart.

pub mod key;

use crate::backend::object_store::ObjectStoreClient;
use crate::backend::s3::S3Client;
use crate::backend::{Backend, BackendKind, FsBackend, ObjectStoreBackend};
use crate::config::{Config, RetryPolicy, SyncOptions};
use crate::fs::walker::WalkOptions;
use crate::manifest::{Manifest, ObjectDescriptor};
use crate::utils::errors::{Result, SyncError};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which side of the pair a Location is on. Sync only flows source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Destination => write!(f, "destination"),
        }
    }
}

/// A parsed location argument: a local path or `s3://bucket/prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationSpec {
    Filesystem(PathBuf),
    ObjectStore { bucket: String, prefix: String },
}

impl FromStr for LocationSpec {
    type Err = SyncError;

    fn from_str(param: &str) -> Result<Self> {
        let Some((scheme, rest)) = param.split_once("://") else {
            if param.is_empty() {
                return Err(SyncError::InvalidLocation("empty location".to_string()));
            }
            return Ok(LocationSpec::Filesystem(PathBuf::from(param)));
        };

        match scheme.to_ascii_lowercase().as_str() {
            "s3" => {
                let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(SyncError::InvalidLocation(format!("missing bucket in {}", param)));
                }
                Ok(LocationSpec::ObjectStore {
                    bucket: bucket.to_string(),
                    prefix: key::normalize_key(prefix),
                })
            }
            "file" if !rest.is_empty() => Ok(LocationSpec::Filesystem(PathBuf::from(rest))),
            _ => Err(SyncError::UnsupportedScheme {
                scheme: scheme.to_string(),
                location: param.to_string(),
            }),
        }
    }
}

impl fmt::Display for LocationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationSpec::Filesystem(path) => write!(f, "{}", path.display()),
            LocationSpec::ObjectStore { bucket, prefix } if prefix.is_empty() => {
                write!(f, "s3://{}", bucket)
            }
            LocationSpec::ObjectStore { bucket, prefix } => write!(f, "s3://{}/{}", bucket, prefix),
        }
    }
}

/// One endpoint: a backend, its role and its manifest.
pub struct Location {
    backend: Backend,
    role: Role,
    manifest: Manifest,
    noop: bool,
    retry: RetryPolicy,
}

impl Location {
    pub fn new(backend: Backend, role: Role, options: &SyncOptions) -> Self {
        Self {
            backend,
            role,
            manifest: Manifest::new(),
            noop: options.noop,
            retry: options.retry,
        }
    }

    /// Connect to the backend named by `spec`.
    pub async fn resolve(
        spec: &LocationSpec,
        role: Role,
        config: &Config,
        options: &SyncOptions,
    ) -> Result<Self> {
        let backend = match spec {
            LocationSpec::Filesystem(path) => Backend::Filesystem(FsBackend::new(
                path.clone(),
                WalkOptions::with_excludes(options.exclude.clone()),
            )?),
            LocationSpec::ObjectStore { bucket, prefix } => {
                let client: Arc<dyn ObjectStoreClient> =
                    Arc::new(S3Client::new(bucket.clone(), &config.s3).await);
                Backend::ObjectStore(ObjectStoreBackend::new(client, prefix.clone()))
            }
        };

        Ok(Self::new(backend, role, options))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.storage().kind()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn root(&self) -> String {
        self.backend.storage().root()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    /// Replace the manifest with a full listing of the backend.
    pub async fn build_manifest(&mut self) -> Result<()> {
        let descriptors = self.backend.storage().list().await?;
        self.manifest = descriptors.into_iter().collect();

        info!(
            "Built {} manifest for {}: {} objects, {} bytes",
            self.role,
            self.root(),
            self.manifest.len(),
            self.manifest.total_bytes()
        );
        Ok(())
    }

    /// Log every manifest entry.
    pub fn list_manifest(&self) {
        for (key, descriptor) in self.manifest.iter() {
            debug!(
                "[{}] {} {} {}",
                self.role,
                key,
                descriptor.size,
                descriptor.last_modified.to_rfc3339()
            );
        }
    }

    /// Write the content of `descriptor` at `key` and record the result.
    pub async fn put(&mut self, key: &str, descriptor: &ObjectDescriptor) -> Result<()> {
        if self.noop {
            info!("[noop] would put {} ({} bytes) to {}", key, descriptor.size, self.root());
            let mut planned = descriptor.clone();
            planned.key = key.to_string();
            self.manifest.insert(planned);
            return Ok(());
        }

        let storage = self.backend.storage();
        let written = with_retry(self.retry, "put", key, move || async move {
            let body = descriptor.open().await?;
            storage.put(key, body).await
        })
        .await?;

        self.manifest.insert(written);
        Ok(())
    }

    /// Remove `key` from the backend and the manifest.
    pub async fn delete(&mut self, key: &str) -> Result<()> {
        if self.noop {
            info!("[noop] would delete {} from {}", key, self.root());
            self.manifest.remove(key);
            return Ok(());
        }

        let storage = self.backend.storage();
        with_retry(self.retry, "delete", key, move || storage.delete(key)).await?;

        self.manifest.remove(key);
        Ok(())
    }
}

async fn with_retry<T, F, Fut>(retry: RetryPolicy, op: &str, key: &str, mut attempt_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retry.max_attempts => {
                attempt += 1;
                let delay = retry.backoff(attempt);
                warn!("{} of {} failed ({}), retrying in {}ms", op, key, e, delay.as_millis());
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The source and destination of one run.
pub struct SyncPair {
    pub source: Location,
    pub destination: Location,
}

impl SyncPair {
    pub fn new(source: Location, destination: Location) -> Self {
        Self { source, destination }
    }

    /// Resolve both endpoints and build their manifests.
    pub async fn open(
        source: &LocationSpec,
        destination: &LocationSpec,
        config: &Config,
        options: &SyncOptions,
    ) -> Result<Self> {
        let mut source = Location::resolve(source, Role::Source, config, options).await?;
        let mut destination = Location::resolve(destination, Role::Destination, config, options).await?;

        source.build_manifest().await?;
        source.list_manifest();
        destination.build_manifest().await?;
        destination.list_manifest();

        Ok(Self::new(source, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryObjectStore, StoreOp};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fs_location(dir: &TempDir, role: Role, options: &SyncOptions) -> Location {
        let backend = FsBackend::new(dir.path(), WalkOptions::default()).unwrap();
        Location::new(Backend::Filesystem(backend), role, options)
    }

    #[test]
    fn test_parse_location_specs() {
        assert_eq!(
            "/tmp/boo".parse::<LocationSpec>().unwrap(),
            LocationSpec::Filesystem(PathBuf::from("/tmp/boo"))
        );
        assert_eq!(
            "s3://alienthtest/".parse::<LocationSpec>().unwrap(),
            LocationSpec::ObjectStore {
                bucket: "alienthtest".to_string(),
                prefix: String::new()
            }
        );
        assert_eq!(
            "s3://bucket/some//prefix/".parse::<LocationSpec>().unwrap(),
            LocationSpec::ObjectStore {
                bucket: "bucket".to_string(),
                prefix: "some/prefix".to_string()
            }
        );
        assert_eq!(
            "file:///srv/data".parse::<LocationSpec>().unwrap(),
            LocationSpec::Filesystem(PathBuf::from("/srv/data"))
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = "gs://bucket/x".parse::<LocationSpec>().unwrap_err();
        assert!(matches!(err, SyncError::UnsupportedScheme { ref scheme, .. } if scheme == "gs"));
        assert!("s3:///nobucket".parse::<LocationSpec>().is_err());
        assert!("".parse::<LocationSpec>().is_err());
    }

    #[test]
    fn test_spec_display() {
        let spec: LocationSpec = "s3://b/p/q".parse().unwrap();
        assert_eq!(spec.to_string(), "s3://b/p/q");
    }

    #[tokio::test]
    async fn test_build_manifest_replaces_previous() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a"), b"1").unwrap();

        let options = SyncOptions::default();
        let mut location = fs_location(&dir, Role::Source, &options);
        location.build_manifest().await.unwrap();
        assert_eq!(location.manifest().len(), 1);

        fs::remove_file(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("b"), b"22").unwrap();
        location.build_manifest().await.unwrap();

        assert_eq!(location.manifest().keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_put_and_delete_update_manifest() {
        let source_dir = TempDir::new().unwrap();
        let destination_dir = TempDir::new().unwrap();
        fs::create_dir(source_dir.path().join("sub")).unwrap();
        fs::write(source_dir.path().join("sub/file.txt"), b"hello").unwrap();

        let options = SyncOptions::default();
        let mut source = fs_location(&source_dir, Role::Source, &options);
        let mut destination = fs_location(&destination_dir, Role::Destination, &options);
        source.build_manifest().await.unwrap();

        let descriptor = source.manifest().get("sub/file.txt").unwrap().clone();
        destination.put("sub/file.txt", &descriptor).await.unwrap();

        assert_eq!(fs::read(destination_dir.path().join("sub/file.txt")).unwrap(), b"hello");
        assert_eq!(destination.manifest().get("sub/file.txt").map(|d| d.size), Some(5));

        destination.delete("sub/file.txt").await.unwrap();
        assert!(!destination_dir.path().join("sub/file.txt").exists());
        assert!(destination.manifest().is_empty());

        // Deleting again is a no-op success
        destination.delete("sub/file.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_put_skips_backend() {
        let source_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("x"), b"abc").unwrap();
        let store = Arc::new(MemoryObjectStore::new("bucket"));

        let options = SyncOptions {
            noop: true,
            ..SyncOptions::default()
        };
        let mut source = fs_location(&source_dir, Role::Source, &options);
        let mut destination = Location::new(
            Backend::ObjectStore(ObjectStoreBackend::new(store.clone(), "")),
            Role::Destination,
            &options,
        );
        source.build_manifest().await.unwrap();

        let descriptor = source.manifest().get("x").unwrap().clone();
        destination.put("x", &descriptor).await.unwrap();
        destination.delete("y").await.unwrap();

        assert!(store.ops().is_empty());
        assert!(destination.manifest().contains_key("x"));
    }

    #[tokio::test]
    async fn test_put_retries_until_exhausted() {
        let source_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("x"), b"abc").unwrap();
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        store.fail_put("x");

        let options = SyncOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
            },
            ..SyncOptions::default()
        };
        let mut source = fs_location(&source_dir, Role::Source, &options);
        let mut destination = Location::new(
            Backend::ObjectStore(ObjectStoreBackend::new(store.clone(), "")),
            Role::Destination,
            &options,
        );
        source.build_manifest().await.unwrap();

        let descriptor = source.manifest().get("x").unwrap().clone();
        let err = destination.put("x", &descriptor).await.unwrap_err();

        assert!(matches!(err, SyncError::Backend { op: "put", ref key, .. } if key == "x"));
        assert_eq!(store.ops().len(), 3);
        assert!(store.ops().iter().all(|op| *op == StoreOp::Put("x".to_string())));
        assert!(destination.manifest().is_empty());
    }

    #[tokio::test]
    async fn test_object_store_source_to_filesystem_destination() {
        let store = Arc::new(MemoryObjectStore::new("bucket"));
        store.insert("prefix/dir/a.bin", b"0123456789");
        let destination_dir = TempDir::new().unwrap();

        let options = SyncOptions::default();
        let mut source = Location::new(
            Backend::ObjectStore(ObjectStoreBackend::new(store.clone(), "prefix")),
            Role::Source,
            &options,
        );
        let mut destination = fs_location(&destination_dir, Role::Destination, &options);
        source.build_manifest().await.unwrap();

        let descriptor = source.manifest().get("dir/a.bin").unwrap().clone();
        destination.put("dir/a.bin", &descriptor).await.unwrap();

        assert_eq!(
            fs::read(destination_dir.path().join("dir/a.bin")).unwrap(),
            b"0123456789"
        );
    }
}
