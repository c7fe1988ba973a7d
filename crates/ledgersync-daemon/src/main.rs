//! LedgerSync Daemon - Background offline synchronization service
//!
//! This binary runs as a user service and handles:
//! - Replaying mutations captured while the ERP backend was unreachable
//! - Polling the backend health endpoint to track connectivity
//! - Foreground nudges via `SIGUSR1`
//! - Graceful shutdown on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon opens the local store, builds the HTTP adapter and starts an
//! [`OfflineSyncService`]. A [`HealthCheck`] feeds online/offline
//! signals into the service's monitor. Everything is stopped through one
//! `CancellationToken` triggered on SIGTERM or SIGINT.

use std::sync::Arc;

use anyhow::{Context, Result};
use ledgersync_core::config::{Config, LoggingConfig};
use ledgersync_core::domain::{ConnectivitySignal, SyncEvent};
use ledgersync_core::ports::{ILocalStore, IRemoteApi};
use ledgersync_remote::{HealthCheck, HttpRemoteApi};
use ledgersync_store::{DatabasePool, SqliteLocalStore};
use ledgersync_sync::OfflineSyncService;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// DaemonService
// ============================================================================

/// Owns the configuration, the store pool and the shutdown token
struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database described by `config`
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.store.path)
            .await
            .context("Failed to open local store")?;
        let schema_version = db_pool
            .schema_version()
            .await
            .context("Failed to read store schema version")?;
        info!(path = %config.store.path.display(), schema_version, "Local store ready");

        Ok(Self {
            config,
            db_pool,
            shutdown,
        })
    }

    /// Runs until the shutdown token is cancelled
    ///
    /// 1. Builds the store and remote adapters
    /// 2. Checks the backend once for the initial connectivity state
    /// 3. Starts the sync service, the health check and the signal listeners
    /// 4. Waits for shutdown, then stops everything in order
    async fn run(&self) -> Result<()> {
        let store: Arc<dyn ILocalStore> = Arc::new(
            SqliteLocalStore::new(self.db_pool.pool().clone())
                .with_quota(self.config.store.quota_bytes()),
        );

        let api = HttpRemoteApi::from_config(&self.config.remote)
            .context("Failed to build remote API client")?;
        let health = HealthCheck::new(
            &api,
            &self.config.remote.health_path,
            self.config.remote.health_interval(),
        );

        let initially_online = health.check_once().await;
        info!(
            base_url = %api.base_url(),
            online = initially_online,
            "Initial connectivity checked"
        );

        let remote: Arc<dyn IRemoteApi> = Arc::new(api);
        let service =
            OfflineSyncService::init(&self.config, store, remote, initially_online).await?;
        info!(pending = service.queue().pending_count(), "Sync queue loaded");

        let mut tasks = JoinSet::new();
        tasks.spawn(log_events(
            service.events().subscribe(),
            self.shutdown.clone(),
        ));
        tasks.spawn(health.run(
            initially_online,
            service.signals(),
            self.shutdown.clone(),
        ));
        tasks.spawn(foreground_signal(service.signals(), self.shutdown.clone()));

        self.shutdown.cancelled().await;
        info!("Shutting down");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Daemon task failed");
            }
        }
        service.shutdown().await;
        self.db_pool.close().await;

        Ok(())
    }
}

// ============================================================================
// Event logging
// ============================================================================

/// Logs every sync lifecycle event until shutdown
async fn log_events(mut events: broadcast::Receiver<SyncEvent>, shutdown: CancellationToken) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => log_event(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event logger lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::Online => info!("Backend online"),
        SyncEvent::Offline => info!("Backend offline, queueing mutations locally"),
        SyncEvent::SyncStart => debug!("Sync pass started"),
        SyncEvent::SyncComplete { results } => {
            let synced = results.iter().filter(|r| r.is_synced()).count();
            let failed = results.iter().filter(|r| r.is_failed()).count();
            info!(
                synced,
                failed,
                deferred = results.len() - synced - failed,
                "Sync pass completed"
            );
        }
        SyncEvent::SyncError { message } => error!(error = %message, "Sync pass aborted"),
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Maps `SIGUSR1` to [`ConnectivitySignal::Foregrounded`]
#[cfg(unix)]
async fn foreground_signal(signals: mpsc::Sender<ConnectivitySignal>, shutdown: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGUSR1 handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = usr1.recv() => {
                if received.is_none() {
                    break;
                }
                info!("Received SIGUSR1, requesting sync");
                if signals.send(ConnectivitySignal::Foregrounded).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn foreground_signal(_signals: mpsc::Sender<ConnectivitySignal>, shutdown: CancellationToken) {
    shutdown.cancelled().await;
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

/// `RUST_LOG` wins over the configured level
fn env_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
}

fn init_tracing(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(logging))
        .with_target(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();
    let config = if config_path.exists() {
        Config::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };

    init_tracing(&config.logging);
    info!(config_path = %config_path.display(), "LedgerSync daemon starting (ledgersyncd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(%e, "Invalid configuration");
        }
        anyhow::bail!("Configuration has {} error(s)", errors.len());
    }

    let shutdown_token = CancellationToken::new();

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token.clone()).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("LedgerSync daemon shut down gracefully"),
        Err(e) => error!(error = %e, "LedgerSync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
