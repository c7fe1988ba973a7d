//! Queue command - Inspect and reset the offline mutation queue
//!
//! Provides the `ledgersync queue` CLI command which:
//! 1. Lists queued operations with their status and last failure
//! 2. Clears the queue, discarding every unsynced mutation

use anyhow::Result;
use clap::Subcommand;
use ledgersync_core::domain::SyncOperation;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, truncate, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queued operations
    List,
    /// Discard every queued operation
    Clear {
        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },
}

impl QueueCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        match self {
            QueueCommand::List => execute_list(ctx, format).await,
            QueueCommand::Clear { yes } => execute_clear(ctx, *yes, format).await,
        }
    }
}

async fn execute_list(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let queue = ctx.open_queue().await?;
    let operations = queue.list().await?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "count": operations.len(),
            "operations": operations,
        }));
        return Ok(());
    }

    if operations.is_empty() {
        formatter.success("Sync queue is empty");
        return Ok(());
    }

    formatter.success(&format!("{} queued operation(s)", operations.len()));
    formatter.info("");
    formatter.info(&format!(
        "{:>5}  {:<15} {:<7} {:<32} {:<8} {:>5}  {}",
        "ID", "ENTITY", "OP", "TARGET", "STATUS", "TRIES", "LAST ERROR"
    ));
    for op in &operations {
        formatter.info(&render_row(op));
    }
    Ok(())
}

fn render_row(op: &SyncOperation) -> String {
    let last_error = op
        .last_error
        .as_ref()
        .map(|f| truncate(&f.to_string(), 40))
        .unwrap_or_default();
    format!(
        "{:>5}  {:<15} {:<7} {:<32} {:<8} {:>5}  {}",
        op.id.get(),
        op.entity.name(),
        op.kind.name(),
        truncate(&op.resource_path(), 32),
        op.status.as_str(),
        op.retry_count,
        last_error
    )
}

async fn execute_clear(ctx: &CliContext, yes: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let queue = ctx.open_queue().await?;
    let pending = queue.list().await?.len();

    if pending > 0 && !yes && !format.is_json() {
        formatter.warn(&format!(
            "This discards {pending} unsynced operation(s). Re-run with --yes to confirm."
        ));
        return Ok(());
    }

    queue.clear().await?;
    info!(discarded = pending, "Sync queue cleared from CLI");

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "discarded": pending,
        }));
    } else {
        formatter.success(&format!("Discarded {pending} operation(s)"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ledgersync_core::domain::{EntityKind, FailureInfo, OperationRequest, RecordId};

    use super::*;
    use crate::commands::test_support::temp_context;

    #[test]
    fn test_render_row_includes_failure() {
        let mut op = SyncOperation::from_request(
            ledgersync_core::domain::OperationId::new(7),
            OperationRequest::delete(
                EntityKind::Sale,
                "/api/sales",
                RecordId::new("INV-001").unwrap(),
            ),
            chrono::Utc::now(),
        );
        op.mark_failed(FailureInfo::new("not_found", "no such sale"), None);

        let row = render_row(&op);
        assert!(row.contains("/api/sales/INV-001"));
        assert!(row.contains("delete"));
        assert!(row.contains("error"));
        assert!(row.contains("[not_found]"));
    }

    #[tokio::test]
    async fn test_clear_without_confirmation_keeps_queue() {
        let (ctx, _dir) = temp_context();
        let queue = ctx.open_queue().await.unwrap();
        queue
            .enqueue(OperationRequest::delete(
                EntityKind::Customer,
                "/api/crm/customers",
                RecordId::new("C-1").unwrap(),
            ))
            .await
            .unwrap();

        execute_clear(&ctx, false, OutputFormat::Human).await.unwrap();
        assert_eq!(queue.list().await.unwrap().len(), 1);

        execute_clear(&ctx, true, OutputFormat::Human).await.unwrap();
        assert!(queue.list().await.unwrap().is_empty());
    }
}
