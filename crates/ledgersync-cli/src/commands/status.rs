//! Status command - Display offline sync status
//!
//! Provides the `ledgersync status` CLI command which:
//! 1. Counts queued operations by status
//! 2. Shows the oldest queued mutation and the next scheduled retry
//! 3. Reports local storage usage against the configured quota
//! 4. Checks the backend to show current connectivity

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use ledgersync_core::domain::{Collection, SyncOperation};
use ledgersync_core::ports::StorageEstimate;

use super::CliContext;
use crate::output::{format_bytes, get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Do not contact the backend
    #[arg(long)]
    pub offline: bool,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let store = ctx.open_store().await?;
        let operations = CliContext::queue_over(store.clone()).await?.snapshot();
        let cache_entries = store
            .get_all(Collection::Cache)
            .await
            .context("Failed to read cache")?
            .len();
        let storage = store
            .storage_estimate()
            .await
            .context("Failed to estimate storage")?;

        let online = if self.offline {
            None
        } else {
            let api = ctx.remote()?;
            Some(ctx.health_check(&api).check_once().await)
        };

        let report = StatusReport::new(&operations, cache_entries, storage, online);
        if format.is_json() {
            formatter.print_json(&report.to_json());
        } else {
            report.display_human(ctx, &*formatter);
        }
        Ok(())
    }
}

// ============================================================================
// Status report
// ============================================================================

#[derive(Debug)]
struct StatusReport {
    by_status: BTreeMap<&'static str, usize>,
    total: usize,
    oldest_enqueued: Option<DateTime<Utc>>,
    next_retry: Option<DateTime<Utc>>,
    cache_entries: usize,
    storage: StorageEstimate,
    online: Option<bool>,
}

impl StatusReport {
    fn new(
        operations: &[SyncOperation],
        cache_entries: usize,
        storage: StorageEstimate,
        online: Option<bool>,
    ) -> Self {
        let mut by_status = BTreeMap::new();
        for op in operations {
            *by_status.entry(op.status.as_str()).or_insert(0) += 1;
        }
        Self {
            by_status,
            total: operations.len(),
            oldest_enqueued: operations.iter().map(|op| op.enqueued_at).min(),
            next_retry: operations.iter().filter_map(|op| op.next_attempt_at).min(),
            cache_entries,
            storage,
            online,
        }
    }

    fn count(&self, status: &str) -> usize {
        self.by_status.get(status).copied().unwrap_or(0)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "online": self.online,
            "queue": {
                "total": self.total,
                "by_status": self.by_status,
                "oldest_enqueued_at": self.oldest_enqueued.map(|t| t.to_rfc3339()),
                "next_retry_at": self.next_retry.map(|t| t.to_rfc3339()),
            },
            "cache_entries": self.cache_entries,
            "storage": {
                "used_bytes": self.storage.used_bytes,
                "quota_bytes": self.storage.quota_bytes,
                "usage_ratio": self.storage.usage_ratio(),
            },
        })
    }

    fn display_human(&self, ctx: &CliContext, formatter: &dyn OutputFormatter) {
        formatter.success("LedgerSync Status");
        formatter.info("");

        let connectivity = match self.online {
            Some(true) => "online",
            Some(false) => "offline",
            None => "not checked",
        };
        formatter.field("Backend", &format!("{} ({connectivity})", ctx.config.remote.base_url));
        formatter.field("Store", &ctx.config.store.path.display().to_string());
        formatter.info("");

        formatter.field("Queued", &self.total.to_string());
        formatter.field("  pending", &self.count("pending").to_string());
        formatter.field("  error", &self.count("error").to_string());
        if let Some(oldest) = self.oldest_enqueued {
            formatter.field("Oldest", &oldest.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        }
        if let Some(next) = self.next_retry {
            formatter.field("Next retry", &next.format("%Y-%m-%d %H:%M:%S UTC").to_string());
        }
        formatter.info("");

        formatter.field("Cache entries", &self.cache_entries.to_string());
        let usage = match (self.storage.quota_bytes, self.storage.usage_ratio()) {
            (Some(quota), Some(ratio)) => format!(
                "{} of {} ({:.1}%)",
                format_bytes(self.storage.used_bytes),
                format_bytes(quota),
                ratio * 100.0
            ),
            _ => format!("{} (no quota)", format_bytes(self.storage.used_bytes)),
        };
        formatter.field("Storage", &usage);

        if self.count("error") > 0 {
            formatter.info("");
            formatter.warn("Some operations failed; see 'ledgersync queue list'");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use ledgersync_core::domain::{
        EntityKind, FailureInfo, OperationId, OperationRequest, RecordId,
    };

    use super::*;
    use crate::commands::test_support::temp_context;

    fn op(id: i64, minutes_ago: i64) -> SyncOperation {
        SyncOperation::from_request(
            OperationId::new(id),
            OperationRequest::delete(
                EntityKind::Customer,
                "/api/crm/customers",
                RecordId::new(format!("C-{id}")).unwrap(),
            ),
            Utc::now() - Duration::minutes(minutes_ago),
        )
    }

    #[test]
    fn test_report_counts_and_times() {
        let pending = op(1, 10);
        let mut failed = op(2, 5);
        let retry_at = Utc::now() + Duration::seconds(30);
        failed.mark_failed(FailureInfo::new("network", "refused"), Some(retry_at));

        let report = StatusReport::new(
            &[pending.clone(), failed],
            3,
            StorageEstimate {
                used_bytes: 4096,
                quota_bytes: Some(8192),
            },
            Some(false),
        );

        assert_eq!(report.total, 2);
        assert_eq!(report.count("pending"), 1);
        assert_eq!(report.count("error"), 1);
        assert_eq!(report.oldest_enqueued, Some(pending.enqueued_at));
        assert_eq!(report.next_retry, Some(retry_at));

        let json = report.to_json();
        assert_eq!(json["online"], false);
        assert_eq!(json["queue"]["by_status"]["error"], 1);
        assert_eq!(json["cache_entries"], 3);
        assert_eq!(json["storage"]["usage_ratio"], 0.5);
    }

    #[test]
    fn test_report_empty_queue() {
        let report = StatusReport::new(
            &[],
            0,
            StorageEstimate {
                used_bytes: 0,
                quota_bytes: None,
            },
            None,
        );
        assert_eq!(report.total, 0);
        assert!(report.to_json()["queue"]["oldest_enqueued_at"].is_null());
    }

    #[tokio::test]
    async fn test_execute_offline() {
        let (ctx, _dir) = temp_context();
        StatusCommand { offline: true }
            .execute(&ctx, OutputFormat::Json)
            .await
            .unwrap();
    }
}
