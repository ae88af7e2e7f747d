//! Continuous replication of source-side filesystem changes.
//!
//! The OS notification layer is reached through [`WatchSubscription`]; the
//! [`ChangeWatcher`] turns each notification into a source manifest update
//! and a put or delete against the destination, one event at a time.

pub mod notify_subscription;
pub mod watcher;

use crate::utils::errors::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

pub use notify_subscription::NotifySubscription;
pub use watcher::ChangeWatcher;

/// Operation tag carried by a change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOp {
    Created,
    Written,
    Removed,
    Renamed,
    /// Anything the notification layer reports that has no tag above.
    Other(String),
}

impl fmt::Display for WatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchOp::Created => write!(f, "created"),
            WatchOp::Written => write!(f, "written"),
            WatchOp::Removed => write!(f, "removed"),
            WatchOp::Renamed => write!(f, "renamed"),
            WatchOp::Other(tag) => write!(f, "{}", tag),
        }
    }
}

/// File system change event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Absolute path
    pub path: PathBuf,
    pub op: WatchOp,
}

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, op: WatchOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }
}

/// A cancellable stream of change notifications for registered directories.
#[async_trait]
pub trait WatchSubscription: Send {
    /// Start receiving notifications for the direct entries of `path`.
    fn watch(&mut self, path: &Path) -> Result<()>;

    /// Next notification in arrival order; `None` once the subscription ends.
    async fn next_event(&mut self) -> Option<Result<WatchEvent>>;
}
