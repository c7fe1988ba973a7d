//! Backend reachability checks
//!
//! Polls `GET {base_url}{health_path}` and reports transitions as
//! [`ConnectivitySignal`]s. A 2xx response means online; any other status
//! or a transport error means offline.

use std::time::Duration;

use ledgersync_core::config::RemoteConfig;
use ledgersync_core::domain::ConnectivitySignal;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::HttpRemoteApi;
use crate::RemoteError;

/// Periodic health check against the ERP backend
#[derive(Debug, Clone)]
pub struct HealthCheck {
    client: Client,
    url: String,
    interval: Duration,
}

impl HealthCheck {
    /// Creates a check that shares the API client's connection pool
    pub fn new(api: &HttpRemoteApi, health_path: &str, interval: Duration) -> Self {
        Self {
            client: api.client().clone(),
            url: format!("{}{}", api.base_url(), health_path),
            interval,
        }
    }

    /// Creates a check from the `remote` configuration section
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let api = HttpRemoteApi::from_config(config)?;
        Ok(Self::new(&api, &config.health_path, config.health_interval()))
    }

    /// URL being checked
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs a single reachability check
    pub async fn check_once(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!(url = %self.url, status = response.status().as_u16(), ok, "Health check");
                ok
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Health check failed");
                false
            }
        }
    }

    /// Polls until `shutdown` is cancelled or the receiver is dropped
    ///
    /// `initially_online` is the state already known to the monitor, so only
    /// real transitions produce signals.
    pub async fn run(
        self,
        initially_online: bool,
        signals: mpsc::Sender<ConnectivitySignal>,
        shutdown: CancellationToken,
    ) {
        let mut online = initially_online;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(url = %self.url, interval_secs = self.interval.as_secs(), "Connectivity check started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now_online = self.check_once().await;
                    if now_online == online {
                        continue;
                    }
                    online = now_online;
                    let signal = if online {
                        ConnectivitySignal::Online
                    } else {
                        ConnectivitySignal::Offline
                    };
                    info!(?signal, "Backend reachability changed");
                    if signals.send(signal).await.is_err() {
                        debug!("Signal receiver dropped, stopping health check");
                        break;
                    }
                }
            }
        }

        info!("Connectivity check stopped");
    }
}
