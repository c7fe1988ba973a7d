//! Config command - View and manage LedgerSync configuration
//!
//! Provides the `ledgersync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use ledgersync_core::config::Config;
use tracing::info;

use super::CliContext;
use crate::output::{get_formatter, OutputFormat};

/// Keys accepted by `config set`
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("store.path", "SQLite database file"),
    ("store.quota_mb", "Storage quota in MiB (0 = unbounded)"),
    ("remote.base_url", "ERP backend base URL"),
    ("remote.access_token", "Bearer token ('none' to unset)"),
    ("remote.request_timeout_secs", "Per-request timeout"),
    ("remote.health_path", "Path requested to check connectivity"),
    ("remote.health_interval_secs", "Seconds between health checks"),
    ("sync.periodic_interval_secs", "Seconds between backstop passes"),
    ("sync.item_timeout_secs", "Upper bound on one replay"),
    ("sync.max_concurrent", "Replays in flight per pass"),
    ("sync.trigger_buffer", "Pending sync trigger capacity"),
    ("retry.base_delay_ms", "First backoff delay (0 = off)"),
    ("retry.max_delay_ms", "Backoff ceiling"),
    ("cache.ttl_secs", "Cache freshness window (0 = forever)"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.json", "true|false"),
];

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.max_concurrent")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(ctx, format),
            ConfigCommand::Set { key, value } => execute_set(ctx, key, value, format),
            ConfigCommand::Validate => execute_validate(ctx, format),
        }
    }
}

fn execute_show(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if format.is_json() {
        let json = serde_json::to_value(&ctx.config)
            .context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
        return Ok(());
    }

    formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
    formatter.info("");
    let yaml =
        serde_yaml::to_string(&ctx.config).context("Failed to serialize configuration to YAML")?;
    for line in yaml.lines() {
        formatter.info(line);
    }
    Ok(())
}

fn execute_set(ctx: &CliContext, key: &str, value: &str, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = ctx.config.clone();

    info!(key, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "error": format!("{e:#}"),
            }));
        } else {
            formatter.error(&format!("Failed to set '{key}': {e:#}"));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, help) in SUPPORTED_KEYS {
                formatter.info(&format!("  {name:<30} {help}"));
            }
        }
        return Ok(());
    }

    let errors: Vec<String> = config.validate().iter().map(ToString::to_string).collect();
    if !errors.is_empty() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "errors": errors,
            }));
        } else {
            formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
        }
        return Ok(());
    }

    if let Some(parent) = ctx.config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(&ctx.config_path, yaml).context("Failed to write configuration file")?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "config_path": ctx.config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {key}"));
        formatter.info(&format!("Saved to {}", ctx.config_path.display()));
    }
    Ok(())
}

fn execute_validate(ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let errors = ctx.config.validate();
    let from_file = ctx.config_path.exists();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": ctx.config_path.display().to_string(),
            "defaults": !from_file,
            "errors": error_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        if from_file {
            formatter.info(&format!("File: {}", ctx.config_path.display()));
        } else {
            formatter.info("No configuration file; using defaults");
        }
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", ctx.config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }
    Ok(())
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    fn number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        value
            .parse::<T>()
            .with_context(|| format!("Expected a non-negative integer for {key}"))
    }

    match key {
        // --- store ---
        "store.path" => config.store.path = PathBuf::from(value),
        "store.quota_mb" => config.store.quota_mb = number(key, value)?,

        // --- remote ---
        "remote.base_url" => config.remote.base_url = value.to_string(),
        "remote.access_token" => {
            config.remote.access_token = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }
        "remote.request_timeout_secs" => config.remote.request_timeout_secs = number(key, value)?,
        "remote.health_path" => config.remote.health_path = value.to_string(),
        "remote.health_interval_secs" => config.remote.health_interval_secs = number(key, value)?,

        // --- sync ---
        "sync.periodic_interval_secs" => config.sync.periodic_interval_secs = number(key, value)?,
        "sync.item_timeout_secs" => config.sync.item_timeout_secs = number(key, value)?,
        "sync.max_concurrent" => config.sync.max_concurrent = number(key, value)?,
        "sync.trigger_buffer" => config.sync.trigger_buffer = number(key, value)?,

        // --- retry ---
        "retry.base_delay_ms" => config.retry.base_delay_ms = number(key, value)?,
        "retry.max_delay_ms" => config.retry.max_delay_ms = number(key, value)?,

        // --- cache ---
        "cache.ttl_secs" => config.cache.ttl_secs = number(key, value)?,

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.json" => {
            config.logging.json = value
                .parse::<bool>()
                .context("Expected true or false for logging.json")?;
        }

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::temp_context;

    #[test]
    fn test_apply_numeric_keys() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.max_concurrent", "8").unwrap();
        apply_config_value(&mut config, "retry.base_delay_ms", "0").unwrap();
        apply_config_value(&mut config, "cache.ttl_secs", "3600").unwrap();
        assert_eq!(config.sync.max_concurrent, 8);
        assert_eq!(config.retry.base_delay_ms, 0);
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn test_apply_access_token_none_unsets() {
        let mut config = Config::default();
        apply_config_value(&mut config, "remote.access_token", "secret").unwrap();
        assert_eq!(config.remote.access_token.as_deref(), Some("secret"));
        apply_config_value(&mut config, "remote.access_token", "none").unwrap();
        assert_eq!(config.remote.access_token, None);
    }

    #[test]
    fn test_apply_rejects_bad_input() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "sync.max_concurrent", "-1").is_err());
        assert!(apply_config_value(&mut config, "logging.json", "yes").is_err());
        assert!(apply_config_value(&mut config, "sync.poll_interval", "10").is_err());
    }

    #[test]
    fn test_every_supported_key_is_applicable() {
        for (key, _) in SUPPORTED_KEYS {
            let mut config = Config::default();
            let value = match *key {
                "logging.json" => "true",
                "logging.level" => "debug",
                "remote.base_url" => "https://erp.example.com",
                "remote.health_path" => "/health",
                "store.path" | "remote.access_token" => "x",
                _ => "1",
            };
            apply_config_value(&mut config, key, value).unwrap();
        }
    }

    #[test]
    fn test_set_writes_file_and_rejects_invalid() {
        let (ctx, _dir) = temp_context();

        execute_set(&ctx, "sync.max_concurrent", "0", OutputFormat::Json).unwrap();
        assert!(!ctx.config_path.exists(), "invalid value must not be saved");

        execute_set(&ctx, "sync.max_concurrent", "2", OutputFormat::Json).unwrap();
        let saved = Config::load(&ctx.config_path).unwrap();
        assert_eq!(saved.sync.max_concurrent, 2);
    }
}
