//! Cache command - Inspect and reset the offline read cache

use anyhow::Result;
use chrono::Utc;
use clap::Subcommand;
use ledgersync_sync::cache::OfflineCache;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show the cached value for a key
    Get {
        /// Cache key, e.g. ledger:2024-25:trial-balance
        key: String,
    },
    /// Remove every cached entry
    Clear,
}

impl CacheCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let store = ctx.open_store().await?;
        let cache = OfflineCache::from_config(store, &ctx.config.cache);

        match self {
            CacheCommand::Get { key } => execute_get(&cache, key, format).await,
            CacheCommand::Clear => execute_clear(&cache, format).await,
        }
    }
}

async fn execute_get(cache: &OfflineCache, key: &str, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    let Some(entry) = cache.get_cached_entry(key).await? else {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({ "key": key, "found": false }));
        } else {
            formatter.warn(&format!("Nothing cached under '{key}'"));
        }
        return Ok(());
    };
    let fresh = cache.get_cached_data(key).await?.is_some();

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "key": entry.key,
            "found": true,
            "stale": !fresh,
            "version": entry.version,
            "cached_at": entry.cached_at.to_rfc3339(),
            "value": entry.value,
        }));
        return Ok(());
    }

    formatter.success(&format!("Cache entry '{}'", entry.key));
    formatter.field("Version", &entry.version.to_string());
    formatter.field(
        "Cached at",
        &entry.cached_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );
    formatter.field("Age", &format!("{}s", entry.age(Utc::now()).num_seconds()));
    if !fresh {
        formatter.warn("Entry is older than the configured TTL");
    }
    formatter.info("");
    let pretty = serde_json::to_string_pretty(&entry.value)?;
    for line in pretty.lines() {
        formatter.info(line);
    }
    Ok(())
}

async fn execute_clear(cache: &OfflineCache, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    cache.clear_cache().await?;
    if format.is_json() {
        formatter.print_json(&serde_json::json!({ "success": true }));
    } else {
        formatter.success("Cache cleared");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::commands::test_support::temp_context;

    #[tokio::test]
    async fn test_get_and_clear() {
        let (ctx, _dir) = temp_context();
        let cache = OfflineCache::from_config(ctx.open_store().await.unwrap(), &ctx.config.cache);
        cache.cache_data("companies:list", json!(["ACME"])).await.unwrap();

        execute_get(&cache, "companies:list", OutputFormat::Human).await.unwrap();
        execute_get(&cache, "missing", OutputFormat::Json).await.unwrap();

        CacheCommand::Clear
            .execute(&ctx, OutputFormat::Human)
            .await
            .unwrap();
        assert!(cache.get_cached_entry("companies:list").await.unwrap().is_none());
    }
}
