//! Explicit lifecycle for the offline sync subsystem
//!
//! [`OfflineSyncService::init`] wires the queue, cache, engine and event bus
//! around caller-supplied store and remote adapters, then spawns the
//! connectivity monitor. Connectivity changes are fed in through
//! [`OfflineSyncService::signals`].

use std::sync::Arc;

use anyhow::{bail, Result};
use ledgersync_core::config::Config;
use ledgersync_core::domain::ConnectivitySignal;
use ledgersync_core::ports::{ILocalStore, IRemoteApi};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::OfflineCache;
use crate::connectivity::ConnectivityState;
use crate::engine::{EngineSettings, SyncEngine};
use crate::events::EventBus;
use crate::monitor::ConnectivityMonitor;
use crate::queue::SyncQueue;

/// Capacity of the connectivity signal channel
const SIGNAL_BUFFER: usize = 16;

pub struct OfflineSyncService {
    state: Arc<ConnectivityState>,
    events: Arc<EventBus>,
    queue: Arc<SyncQueue>,
    cache: Arc<OfflineCache>,
    engine: Arc<SyncEngine>,
    signals: mpsc::Sender<ConnectivitySignal>,
    shutdown: CancellationToken,
    monitor: JoinHandle<()>,
}

impl OfflineSyncService {
    /// Builds every component and starts the monitor
    ///
    /// The queue mirror is loaded from `store` first. Fails if `config` does
    /// not validate or the queue cannot be read.
    pub async fn init(
        config: &Config,
        store: Arc<dyn ILocalStore>,
        remote: Arc<dyn IRemoteApi>,
        initially_online: bool,
    ) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            bail!("Invalid configuration: {joined}");
        }

        let state = Arc::new(ConnectivityState::new(initially_online));
        let events = Arc::new(EventBus::new());

        let (trigger_tx, trigger_rx) = mpsc::channel(config.sync.trigger_buffer);
        let queue = Arc::new(
            SyncQueue::load(store.clone(), state.clone())
                .await?
                .with_trigger(trigger_tx),
        );
        let cache = Arc::new(OfflineCache::from_config(store, &config.cache));
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            remote,
            state.clone(),
            events.clone(),
            EngineSettings::from_config(config),
        ));

        let (signals, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let shutdown = CancellationToken::new();
        let monitor = ConnectivityMonitor::new(
            engine.clone(),
            state.clone(),
            events.clone(),
            config.sync.periodic_interval(),
        );
        let monitor = tokio::spawn(monitor.run(signal_rx, trigger_rx, shutdown.clone()));

        info!(
            online = initially_online,
            queued = queue.pending_count(),
            "Offline sync service started"
        );

        Ok(Self {
            state,
            events,
            queue,
            cache,
            engine,
            signals,
            shutdown,
            monitor,
        })
    }

    pub fn queue(&self) -> &Arc<SyncQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Arc<OfflineCache> {
        &self.cache
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> &Arc<ConnectivityState> {
        &self.state
    }

    /// Sender for host connectivity signals
    pub fn signals(&self) -> mpsc::Sender<ConnectivitySignal> {
        self.signals.clone()
    }

    /// Stops the monitor and waits for any in-flight pass
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.monitor.await {
            warn!(error = %e, "Connectivity monitor task failed");
        }
        info!("Offline sync service stopped");
    }
}
