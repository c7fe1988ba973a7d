//! Connectivity check behavior

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ledgersync_core::domain::ConnectivitySignal;
use ledgersync_remote::HealthCheck;

use crate::common::{mount_health, setup_remote_mock, unreachable_api};

#[tokio::test]
async fn test_check_once_online_and_offline() {
    let (server, api) = setup_remote_mock().await;
    mount_health(&server, 200).await;
    let health = HealthCheck::new(&api, "/api/health", Duration::from_millis(50));
    assert!(health.check_once().await);

    let (down, api) = setup_remote_mock().await;
    mount_health(&down, 503).await;
    let health = HealthCheck::new(&api, "/api/health", Duration::from_millis(50));
    assert!(!health.check_once().await);
}

#[tokio::test]
async fn test_check_once_unreachable_is_offline() {
    let api = unreachable_api();
    let health = HealthCheck::new(&api, "/api/health", Duration::from_millis(50));
    assert!(!health.check_once().await);
}

#[tokio::test]
async fn test_run_emits_only_transitions() {
    let (server, api) = setup_remote_mock().await;
    mount_health(&server, 200).await;
    let health = HealthCheck::new(&api, "/api/health", Duration::from_millis(20));

    let (tx, mut rx) = mpsc::channel(8);
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(health.run(false, tx, shutdown.clone()));

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("health check should report a transition")
        .expect("channel open");
    assert_eq!(first, ConnectivitySignal::Online);

    // Still online: several more ticks must not produce signals.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_stops_when_receiver_dropped() {
    let (server, api) = setup_remote_mock().await;
    mount_health(&server, 200).await;
    let health = HealthCheck::new(&api, "/api/health", Duration::from_millis(10));

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let handle = tokio::spawn(health.run(false, tx, CancellationToken::new()));

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("health check should stop on its own")
        .unwrap();
}
