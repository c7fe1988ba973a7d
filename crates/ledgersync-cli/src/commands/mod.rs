//! CLI subcommands and the wiring they share

pub mod cache;
pub mod config;
pub mod enqueue;
pub mod queue;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ledgersync_core::config::Config;
use ledgersync_core::ports::ILocalStore;
use ledgersync_remote::{HealthCheck, HttpRemoteApi};
use ledgersync_store::{DatabasePool, SqliteLocalStore};
use ledgersync_sync::connectivity::ConnectivityState;
use ledgersync_sync::queue::SyncQueue;
use tracing::debug;

/// Configuration resolved once per invocation
pub struct CliContext {
    pub config: Config,
    pub config_path: PathBuf,
}

impl CliContext {
    /// Loads `path`, or the default location when none is given
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map_or_else(Config::default_path, Path::to_path_buf);
        let config = if config_path.exists() {
            Config::load(&config_path)
                .with_context(|| format!("Failed to load {}", config_path.display()))?
        } else {
            Config::default()
        };
        debug!(config_path = %config_path.display(), "Loaded configuration");
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Opens (creating if needed) the local store
    pub async fn open_store(&self) -> Result<Arc<dyn ILocalStore>> {
        let pool = DatabasePool::new(&self.config.store.path)
            .await
            .context("Failed to open local store")?;
        Ok(Arc::new(
            SqliteLocalStore::new(pool.pool().clone()).with_quota(self.config.store.quota_bytes()),
        ))
    }

    /// Queue handle for commands that only touch local state
    ///
    /// The queue never triggers a pass here; a running daemon picks the
    /// work up on its next tick.
    pub async fn open_queue(&self) -> Result<SyncQueue> {
        let store = self.open_store().await?;
        Self::queue_over(store).await
    }

    /// Offline queue over an already opened store, mirror loaded
    pub async fn queue_over(store: Arc<dyn ILocalStore>) -> Result<SyncQueue> {
        SyncQueue::load(store, Arc::new(ConnectivityState::new(false))).await
    }

    pub fn remote(&self) -> Result<HttpRemoteApi> {
        HttpRemoteApi::from_config(&self.config.remote).context("Failed to build remote API client")
    }

    pub fn health_check(&self, api: &HttpRemoteApi) -> HealthCheck {
        HealthCheck::new(
            api,
            &self.config.remote.health_path,
            self.config.remote.health_interval(),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use ledgersync_core::config::ConfigBuilder;
    use tempfile::TempDir;

    use super::*;

    /// Context whose store lives in a temporary directory
    pub fn temp_context() -> (CliContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigBuilder::new()
            .store_path(dir.path().join("offline.db"))
            .remote_base_url("http://127.0.0.1:9")
            .remote_request_timeout_secs(1)
            .build();
        let ctx = CliContext {
            config,
            config_path: dir.path().join("config.yaml"),
        };
        (ctx, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let ctx = CliContext::load(Some(&path)).unwrap();
        assert_eq!(ctx.config_path, path);
        assert_eq!(ctx.config.sync.max_concurrent, Config::default().sync.max_concurrent);
    }

    #[test]
    fn test_load_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync: [not, a, mapping]").unwrap();
        assert!(CliContext::load(Some(&path)).is_err());
    }

    #[tokio::test]
    async fn test_open_store_creates_database() {
        let (ctx, _dir) = test_support::temp_context();
        let store = ctx.open_store().await.unwrap();
        assert!(ctx.config.store.path.exists());
        assert!(store.list_operations().await.unwrap().is_empty());
    }
}
