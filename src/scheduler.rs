use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::app::scheduled_import_use_case::{ScheduledImportError, ScheduledImportUseCase};

/// Runs the import on every tick until `shutdown` resolves. A run always
/// finishes before the next tick is considered; ticks missed meanwhile are
/// skipped.
pub async fn run_schedule<S>(import: Arc<ScheduledImportUseCase>, every: Duration, shutdown: S)
where
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!("Import schedule started, ticking every {:?}", every);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping import schedule");
                break;
            }
            _ = ticker.tick() => run_once(&import).await,
        }
    }
}

async fn run_once(import: &ScheduledImportUseCase) {
    match import.execute().await {
        Ok(report) if report.is_success => info!(
            imported = report.quantity_imported_products,
            "Scheduled import finished in {:.1} ms", report.runtime_in_milliseconds
        ),
        Ok(report) => warn!(
            "Scheduled import recorded a failed run: {}",
            report.failure.as_deref().unwrap_or("unknown error")
        ),
        Err(ScheduledImportError::TooSoon { time_left_ms }) => {
            info!("Skipping import, next run allowed in {} ms", time_left_ms)
        }
        Err(e) => error!("Scheduled import failed: {}", e),
    }
}

/// Resolves on Ctrl-C. If the signal handler cannot be installed the
/// schedule runs until the process is killed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
