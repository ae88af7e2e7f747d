//! [`WatchSubscription`] backed by the platform watcher from `notify`.

use super::{WatchEvent, WatchOp, WatchSubscription};
use crate::utils::errors::Result;
use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error};

pub struct NotifySubscription {
    watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<Event>>,
    pending: VecDeque<WatchEvent>,
}

impl NotifySubscription {
    /// `capacity` bounds how many raw notifications queue up while the loop is busy.
    pub fn new(capacity: usize) -> Result<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        // Runs on notify's own thread, outside the runtime
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Err(e) = tx.blocking_send(res) {
                error!("Failed to forward file event: {}", e);
            }
        })?;

        Ok(Self {
            watcher,
            rx,
            pending: VecDeque::new(),
        })
    }
}

#[async_trait]
impl WatchSubscription for NotifySubscription {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        debug!("Watching {}", path.display());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<WatchEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }

            match self.rx.recv().await? {
                Ok(event) => self.pending.extend(convert_notify_event(event)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Convert a notify event into one event per affected path.
///
/// Access notifications (open/close) are not changes and are dropped here.
fn convert_notify_event(event: Event) -> Vec<WatchEvent> {
    let op = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => WatchOp::Created,
        EventKind::Modify(ModifyKind::Name(_)) => WatchOp::Renamed,
        EventKind::Modify(_) => WatchOp::Written,
        EventKind::Remove(_) => WatchOp::Removed,
        other => WatchOp::Other(format!("{:?}", other)),
    };

    event
        .paths
        .into_iter()
        .map(|path| WatchEvent::new(path, op.clone()))
        .collect()
}
