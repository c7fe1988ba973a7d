//! Connectivity monitor - turns signals, triggers and timers into sync passes
//!
//! ## Flow
//!
//! ```text
//! ConnectivitySignal ──┐
//! SyncTrigger ─────────┼──► ConnectivityMonitor ──spawn──► SyncEngine::sync_all
//! periodic tick ───────┘         │
//!                          online / offline events
//! ```
//!
//! Inputs that are already waiting when the monitor wakes up are drained
//! and coalesced, so a burst (e.g. `Online` immediately followed by
//! `Foregrounded`) starts at most one pass.

use std::sync::Arc;
use std::time::Duration;

use ledgersync_core::domain::{ConnectivitySignal, SyncEvent};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connectivity::{ConnectivityState, SyncTrigger};
use crate::engine::SyncEngine;
use crate::events::EventBus;

/// Owns the decision of when to run a sync pass
pub struct ConnectivityMonitor {
    engine: Arc<SyncEngine>,
    state: Arc<ConnectivityState>,
    events: Arc<EventBus>,
    periodic_interval: Duration,
}

/// What one wake-up of the loop asks for
#[derive(Debug, Default)]
struct Batch {
    sync_requested: bool,
    channel_closed: bool,
}

impl ConnectivityMonitor {
    pub fn new(
        engine: Arc<SyncEngine>,
        state: Arc<ConnectivityState>,
        events: Arc<EventBus>,
        periodic_interval: Duration,
    ) -> Self {
        Self {
            engine,
            state,
            events,
            periodic_interval,
        }
    }

    /// Main event loop
    ///
    /// Runs until `shutdown` is cancelled or the signal channel closes, then
    /// waits for in-flight passes before returning.
    pub async fn run(
        self,
        mut signals: mpsc::Receiver<ConnectivitySignal>,
        mut triggers: mpsc::Receiver<SyncTrigger>,
        shutdown: CancellationToken,
    ) {
        info!(
            online = self.state.is_online(),
            periodic_secs = self.periodic_interval.as_secs(),
            "Connectivity monitor starting"
        );

        let start = Instant::now() + self.periodic_interval;
        let mut ticker = interval_at(start, self.periodic_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut passes = JoinSet::new();
        let mut triggers_open = true;

        loop {
            let mut batch = Batch::default();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, monitor stopping");
                    break;
                }

                signal = signals.recv() => match signal {
                    Some(signal) => self.handle_signal(signal, &mut batch),
                    None => batch.channel_closed = true,
                },

                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(reason) => self.handle_trigger(reason, &mut batch),
                    None => triggers_open = false,
                },

                _ = ticker.tick() => {
                    if self.state.is_online() {
                        debug!("Periodic sync tick");
                        batch.sync_requested = true;
                    }
                }

                Some(joined) = passes.join_next(), if !passes.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Sync pass task failed");
                    }
                    continue;
                }
            }

            // Coalesce whatever else is already waiting.
            loop {
                match signals.try_recv() {
                    Ok(signal) => self.handle_signal(signal, &mut batch),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        batch.channel_closed = true;
                        break;
                    }
                }
            }
            while let Ok(reason) = triggers.try_recv() {
                self.handle_trigger(reason, &mut batch);
            }

            if batch.sync_requested && self.state.is_online() {
                if self.state.is_sync_in_progress() {
                    debug!("Sync pass already running, dropping trigger");
                } else {
                    let engine = self.engine.clone();
                    passes.spawn(async move { engine.sync_all().await });
                }
            }

            if batch.channel_closed {
                info!("Signal channel closed, monitor stopping");
                break;
            }
        }

        while let Some(joined) = passes.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Sync pass task failed during shutdown");
            }
        }
        info!("Connectivity monitor stopped");
    }

    fn handle_signal(&self, signal: ConnectivitySignal, batch: &mut Batch) {
        match signal {
            ConnectivitySignal::Online => {
                if self.state.set_online(true) {
                    info!("Connectivity restored");
                    self.events.emit(&SyncEvent::Online);
                }
                batch.sync_requested = true;
            }
            ConnectivitySignal::Offline => {
                if self.state.set_online(false) {
                    info!("Connectivity lost");
                    self.events.emit(&SyncEvent::Offline);
                }
            }
            ConnectivitySignal::Foregrounded => {
                if self.state.is_online() {
                    batch.sync_requested = true;
                }
            }
        }
    }

    fn handle_trigger(&self, reason: SyncTrigger, batch: &mut Batch) {
        debug!(?reason, "Sync trigger received");
        if self.state.is_online() {
            batch.sync_requested = true;
        }
    }
}
