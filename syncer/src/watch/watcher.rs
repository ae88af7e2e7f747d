//! The watch loop: source notifications in, destination puts/deletes out.

use super::{WatchEvent, WatchOp, WatchSubscription};
use crate::backend::FsBackend;
use crate::config::{RenamePolicy, SyncOptions};
use crate::fs::walker::{self, walk_directories};
use crate::location::{Location, Role};
use crate::utils::errors::{Result, SyncError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Applies live source changes to the destination, strictly one event at a time.
pub struct ChangeWatcher<'a, S: WatchSubscription> {
    source: &'a mut Location,
    destination: &'a mut Location,
    fs: FsBackend,
    subscription: S,
    watched: HashSet<PathBuf>,
    recursive: bool,
    rename: RenamePolicy,
}

impl<'a, S: WatchSubscription> ChangeWatcher<'a, S> {
    /// The source must be a filesystem Location in the source role.
    pub fn new(
        source: &'a mut Location,
        destination: &'a mut Location,
        subscription: S,
        options: &SyncOptions,
    ) -> Result<Self> {
        if source.role() != Role::Source {
            return Err(SyncError::WrongRole { root: source.root() });
        }
        if destination.role() != Role::Destination {
            return Err(SyncError::Config(format!(
                "{} is not a destination location",
                destination.root()
            )));
        }

        let fs = source.backend().as_filesystem().cloned().ok_or_else(|| {
            SyncError::Config(format!(
                "cannot watch {}: only filesystem sources can be watched (use --one-time)",
                source.root()
            ))
        })?;

        Ok(Self {
            source,
            destination,
            fs,
            subscription,
            watched: HashSet::new(),
            recursive: options.recursive,
            rename: options.rename,
        })
    }

    /// Register the root and, in recursive mode, every directory below it.
    pub fn start(&mut self) -> Result<()> {
        let root = self.fs.root_path().to_path_buf();
        self.register(&root)?;

        if self.recursive {
            for dir in walk_directories(&root, self.fs.walk_options())? {
                self.register(&dir)?;
            }
        }

        let registered = self.watched.len();
        info!(
            "Watching {} ({} director{}, recursive: {})",
            self.fs.root_path().display(),
            registered,
            if registered == 1 { "y" } else { "ies" },
            self.recursive
        );
        Ok(())
    }

    fn register(&mut self, dir: &Path) -> Result<bool> {
        if self.watched.contains(dir) {
            return Ok(false);
        }
        self.subscription.watch(dir)?;
        self.watched.insert(dir.to_path_buf());
        Ok(true)
    }

    /// Consume notifications until the subscription ends or an event fails.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(event) = self.subscription.next_event().await {
            self.handle_event(event?).await?;
        }

        info!("Watch subscription for {} ended", self.fs.root_path().display());
        Ok(())
    }

    /// Apply one notification.
    pub async fn handle_event(&mut self, event: WatchEvent) -> Result<()> {
        let Some(key) = self.fs.key_for(&event.path) else {
            warn!(
                "Ignoring {} event outside of {}: {}",
                event.op,
                self.fs.root_path().display(),
                event.path.display()
            );
            return Ok(());
        };

        if self.is_excluded(&key) {
            debug!("Ignoring {} event for excluded {}", event.op, key);
            return Ok(());
        }

        debug!("{} {}", event.op, key);

        match event.op {
            WatchOp::Created => self.created(&key, &event.path).await,
            WatchOp::Written => self.upsert(&key, &event.path).await,
            WatchOp::Removed => self.removed(&key, &event.path).await,
            WatchOp::Renamed => match self.rename {
                RenamePolicy::DeleteCreate if event.path.exists() => self.created(&key, &event.path).await,
                RenamePolicy::DeleteCreate => self.removed(&key, &event.path).await,
                RenamePolicy::Fatal => Err(SyncError::UnhandledEvent {
                    op: event.op.to_string(),
                    path: event.path,
                }),
            },
            WatchOp::Other(op) => Err(SyncError::UnhandledEvent { op, path: event.path }),
        }
    }

    fn is_excluded(&self, key: &str) -> bool {
        walker::is_excluded(Path::new(key), &self.fs.walk_options().exclude_patterns)
    }

    async fn created(&mut self, key: &str, path: &Path) -> Result<()> {
        if path.is_dir() {
            if self.recursive && self.register(path)? {
                info!("Watching new directory {}", path.display());
            }
            return Ok(());
        }
        self.upsert(key, path).await
    }

    async fn upsert(&mut self, key: &str, path: &Path) -> Result<()> {
        let Some(descriptor) = self.fs.describe(key, path)? else {
            if !path.is_dir() {
                warn!("{} vanished before it could be read, skipping", path.display());
            }
            return Ok(());
        };

        self.source.manifest_mut().insert(descriptor.clone());
        info!("pushing {} to destination.", key);
        self.destination.put(key, &descriptor).await
    }

    /// Delete `key` and, if it named a directory, every key below it.
    ///
    /// A removed directory loses its kernel watch, so it and everything below
    /// it must be registered again if it reappears.
    async fn removed(&mut self, key: &str, path: &Path) -> Result<()> {
        self.watched.retain(|dir| !dir.starts_with(path));

        let mut keys = self.source.manifest().keys_under(key);
        keys.push(key.to_string());

        for key in keys {
            info!("deleting {} from destination.", key);
            self.destination.delete(&key).await?;
            self.source.manifest_mut().remove(&key);
        }
        Ok(())
    }
}
