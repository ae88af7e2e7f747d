//! One sync run: initial reconciliation, then the watch phase.

use crate::config::{Config, SyncOptions};
use crate::location::{LocationSpec, SyncPair};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::utils::errors::Result;
use crate::watch::{ChangeWatcher, NotifySubscription};
use tracing::info;

/// Reconcile `destination` against `source` and, unless `one_time` is set,
/// keep applying source changes until the subscription ends or fails.
pub async fn run(
    source: &LocationSpec,
    destination: &LocationSpec,
    config: &Config,
    options: &SyncOptions,
) -> Result<ReconcileReport> {
    let mut pair = SyncPair::open(source, destination, config, options).await?;

    let report = reconcile(&pair.source, &mut pair.destination, options)
        .await?
        .ensure_success()?;

    if options.one_time {
        info!("One-time run, skipping watch phase");
        return Ok(report);
    }

    let subscription = NotifySubscription::new(options.channel_capacity)?;
    let mut watcher = ChangeWatcher::new(
        &mut pair.source,
        &mut pair.destination,
        subscription,
        options,
    )?;
    watcher.start()?;
    watcher.run().await?;

    Ok(report)
}
