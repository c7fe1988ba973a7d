//! Sync command - Replay the offline queue once
//!
//! Provides the `ledgersync sync` CLI command which:
//! 1. Loads configuration and opens the local store
//! 2. Checks the backend health endpoint
//! 3. Runs a single pass through the sync service and reports per-item results

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use ledgersync_core::domain::{ItemOutcome, ItemResult, SyncEvent};
use ledgersync_core::ports::IRemoteApi;
use ledgersync_sync::OfflineSyncService;
use tokio::sync::broadcast;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Skip the health check and attempt the pass regardless
    #[arg(long)]
    pub force: bool,
}

/// What one pass produced, as seen through the event bus
#[derive(Debug, PartialEq)]
enum PassOutcome {
    Completed(Vec<ItemResult>),
    Aborted(String),
    Skipped,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let store = ctx.open_store().await?;
        let api = ctx.remote()?;

        let online = self.force || ctx.health_check(&api).check_once().await;
        if !online {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "online": false,
                    "error": "Backend unreachable",
                }));
            } else {
                formatter.error(&format!("Backend unreachable at {}", api.base_url()));
                formatter.info("Queued operations are kept and will sync once it is back.");
            }
            return Ok(());
        }

        let remote: Arc<dyn IRemoteApi> = Arc::new(api);
        let service = OfflineSyncService::init(&ctx.config, store, remote, true).await?;
        let mut events = service.events().subscribe();

        info!("Running one sync pass");
        let ran = service.engine().sync_all().await;
        let outcome = collect_outcome(&mut events);
        info!(ran, "Sync pass returned");
        service.shutdown().await;

        report(&outcome, format, &*formatter);
        Ok(())
    }
}

/// Drains already-broadcast events for the pass result
fn collect_outcome(events: &mut broadcast::Receiver<SyncEvent>) -> PassOutcome {
    let mut outcome = PassOutcome::Skipped;
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::SyncComplete { results } => outcome = PassOutcome::Completed(results),
            SyncEvent::SyncError { message } => outcome = PassOutcome::Aborted(message),
            _ => {}
        }
    }
    outcome
}

fn report(outcome: &PassOutcome, format: OutputFormat, formatter: &dyn OutputFormatter) {
    match outcome {
        PassOutcome::Completed(results) => {
            let synced = results.iter().filter(|r| r.is_synced()).count();
            let failed = results.iter().filter(|r| r.is_failed()).count();
            let deferred = results.len() - synced - failed;

            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": true,
                    "synced": synced,
                    "failed": failed,
                    "deferred": deferred,
                    "results": results,
                }));
                return;
            }

            formatter.success(&format!(
                "Sync complete: {synced} synced, {failed} failed, {deferred} deferred"
            ));
            for result in results {
                match &result.outcome {
                    ItemOutcome::Synced => {}
                    ItemOutcome::Failed { failure } => formatter.info(&format!(
                        "#{} failed (attempt {}): {}",
                        result.operation_id, result.retry_count, failure
                    )),
                    ItemOutcome::Deferred => formatter.info(&format!(
                        "#{} waiting for backoff",
                        result.operation_id
                    )),
                }
            }
        }
        PassOutcome::Aborted(message) => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "error": message,
                }));
            } else {
                formatter.error(&format!("Sync pass aborted: {message}"));
            }
        }
        PassOutcome::Skipped => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "error": "Sync pass skipped",
                }));
            } else {
                formatter.warn("Sync pass skipped; another process (usually ledgersyncd) is replaying the queue");
            }
        }
    }
}
