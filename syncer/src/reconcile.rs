//! One-time reconciliation of a destination against its source.
//!
//! The plan is computed over the two manifests only; no backend is touched
//! until execution. Each key is applied on its own: a failure on one key
//! never rolls back keys already applied.

use crate::backend::BackendKind;
use crate::config::{CompareMode, FailurePolicy, SyncOptions};
use crate::location::Location;
use crate::manifest::{Manifest, ObjectDescriptor};
use crate::utils::errors::{Result, SyncError};
use std::fmt;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Absent from the destination
    Missing,
    /// Sizes differ
    SizeMismatch,
    /// Same size, but the source copy is newer (same-kind pairs only)
    Newer,
    /// Absent from the source and deletion is enabled
    Extraneous,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Missing => write!(f, "missing"),
            Reason::SizeMismatch => write!(f, "mismatched"),
            Reason::Newer => write!(f, "newer"),
            Reason::Extraneous => write!(f, "extraneous"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Put { key: String, reason: Reason },
    Delete { key: String },
}

impl Action {
    pub fn key(&self) -> &str {
        match self {
            Action::Put { key, .. } | Action::Delete { key } => key,
        }
    }
}

/// Ordered list of actions: every put (sorted by key), then every delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub actions: Vec<Action>,
    /// Keys present on both sides that need nothing
    pub unchanged: usize,
}

impl SyncPlan {
    pub fn puts(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| matches!(a, Action::Put { .. }))
    }

    pub fn deletes(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(|a| matches!(a, Action::Delete { .. }))
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn needs_put(
    source: &ObjectDescriptor,
    destination: &ObjectDescriptor,
    compare: CompareMode,
    same_kind: bool,
) -> Option<Reason> {
    if source.size != destination.size {
        return Some(Reason::SizeMismatch);
    }
    // Timestamps from different backends mean different things
    if compare == CompareMode::SizeAndMtime && same_kind && source.last_modified > destination.last_modified {
        return Some(Reason::Newer);
    }
    None
}

/// Compute the actions that bring `destination` in line with `source`.
pub fn plan(
    source: &Manifest,
    source_kind: BackendKind,
    destination: &Manifest,
    destination_kind: BackendKind,
    options: &SyncOptions,
) -> SyncPlan {
    let same_kind = source_kind == destination_kind;
    let mut plan = SyncPlan::default();

    for (key, descriptor) in source.iter() {
        let reason = match destination.get(key) {
            None => Some(Reason::Missing),
            Some(existing) => needs_put(descriptor, existing, options.compare, same_kind),
        };

        match reason {
            Some(reason) => plan.actions.push(Action::Put {
                key: key.to_string(),
                reason,
            }),
            None => plan.unchanged += 1,
        }
    }

    if options.delete {
        for key in destination.keys() {
            if !source.contains_key(key) {
                plan.actions.push(Action::Delete { key: key.to_string() });
            }
        }
    }

    plan
}

/// A key that could not be applied.
#[derive(Debug)]
pub struct KeyFailure {
    pub key: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub uploaded: usize,
    pub uploaded_bytes: u64,
    pub deleted: usize,
    pub unchanged: usize,
    pub failures: Vec<KeyFailure>,
}

impl ReconcileReport {
    /// Turn collected failures into an error.
    pub fn ensure_success(self) -> Result<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some(first) => Err(SyncError::Reconcile {
                failed: self.failures.len(),
                first: first.error.to_string(),
            }),
        }
    }
}

/// Compute and execute the plan, one key at a time.
pub async fn reconcile(
    source: &Location,
    destination: &mut Location,
    options: &SyncOptions,
) -> Result<ReconcileReport> {
    let plan = plan(
        source.manifest(),
        source.kind(),
        destination.manifest(),
        destination.kind(),
        options,
    );

    info!(
        "Reconciling {} -> {}: {} put(s), {} delete(s), {} unchanged",
        source.root(),
        destination.root(),
        plan.puts().count(),
        plan.deletes().count(),
        plan.unchanged
    );

    let mut report = ReconcileReport {
        unchanged: plan.unchanged,
        ..ReconcileReport::default()
    };

    for action in plan.actions {
        let outcome = match &action {
            Action::Put { key, reason } => {
                let Some(descriptor) = source.manifest().get(key) else {
                    continue;
                };
                info!("pushing {} {} to destination.", reason, key);
                let size = descriptor.size;
                destination.put(key, descriptor).await.map(|()| {
                    report.uploaded += 1;
                    report.uploaded_bytes += size;
                })
            }
            Action::Delete { key } => {
                info!("deleting {} from destination.", key);
                destination.delete(key).await.map(|()| report.deleted += 1)
            }
        };

        if let Err(e) = outcome {
            match options.on_error {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::Continue => {
                    error!("{}", e);
                    report.failures.push(KeyFailure {
                        key: action.key().to_string(),
                        error: e,
                    });
                }
            }
        }
    }

    info!(
        "Reconciliation done: {} uploaded ({} bytes), {} deleted, {} unchanged, {} failed",
        report.uploaded,
        report.uploaded_bytes,
        report.deleted,
        report.unchanged,
        report.failures.len()
    );

    Ok(report)
}
