//! Long-lived loop turning scheduler ticks into collection passes.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::classify::Verdict;
use crate::collector::{Collector, PassSummary};
use crate::error::Result;
use crate::window::TimeWindow;

/// What the worker did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub ticks: u64,
    pub outside_window: u64,
    pub passes: u64,
    pub aborted: u64,
}

/// Consume `ticks` until the stream ends or `shutdown` flips to true.
///
/// Passes run one at a time on this task. Shutdown is only observed between
/// passes, so deletes already in flight finish on their own terms.
pub async fn run<S>(
    collector: &Collector,
    window: &TimeWindow,
    mut ticks: S,
    mut shutdown: watch::Receiver<bool>,
) -> WorkerStats
where
    S: Stream<Item = DateTime<Utc>> + Unpin,
{
    let mut stats = WorkerStats::default();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let tick = tokio::select! {
            tick = ticks.next() => match tick {
                Some(tick) => tick,
                None => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Sender gone, nobody is left to keep us running
                    break;
                }
                continue;
            }
        };
        stats.ticks += 1;

        if !window.contains(tick) {
            info!("{} is outside of window. Continue sleeping", tick);
            stats.outside_window += 1;
            continue;
        }

        info!("Start deleting images {}", tick);
        match collector.run_pass().await {
            Ok(summary) => {
                stats.passes += 1;
                log_summary(&summary);
            }
            Err(e) => {
                stats.aborted += 1;
                error!("Collection pass aborted, retrying on next tick: {}", e);
            }
        }
    }

    info!(?stats, "Worker stopped");
    stats
}

/// Run a single pass right away, outside of any schedule or window
pub async fn run_once(collector: &Collector) -> Result<PassSummary> {
    let summary = collector
        .run_pass()
        .await
        .inspect_err(|e| error!("Collection pass aborted: {}", e))?;
    log_summary(&summary);
    Ok(summary)
}

pub fn log_summary(summary: &PassSummary) {
    if summary.skipped_inactive {
        return;
    }

    let totals = summary.totals();
    info!(
        started_at = %summary.started_at,
        repositories = summary.repositories.len(),
        whitelisted = summary.whitelisted.len(),
        manifests = totals.total(),
        delete_tagged = totals.get(Verdict::DeleteTagged),
        delete_untagged = totals.get(Verdict::DeleteUntagged),
        deleted = summary.deleted(),
        retained = summary.retained(),
        grace_period = totals.get(Verdict::SkipGracePeriod),
        "Collection pass finished"
    );

    for (repository, result) in &summary.repositories {
        if let Some(e) = &result.list_error {
            warn!(repository = %repository, "Listing failed: {}", e);
        }
        for e in &result.delete_errors {
            warn!(repository = %repository, "Delete failed: {}", e);
        }
    }
}
