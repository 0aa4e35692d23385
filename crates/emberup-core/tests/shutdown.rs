//! Shutdown integration tests.

mod common;

use std::time::Duration;

use common::FakePlatform;
use emberup_core::platform::ExitWait;
use emberup_core::process::{ProcessCoordinator, ShutdownError, ShutdownOutcome, ShutdownTimeouts};
use emberup_core::product::ShutdownStrategy;
use mockito::Server;
use reqwest::Client;

const SERVER_PROCESS: Option<&str> = Some("MediaBrowser.ServerApplication");

#[tokio::test]
async fn graceful_shutdown_posts_and_waits() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/mediabrowser/System/Shutdown")
        .with_status(204)
        .create_async()
        .await;
    let url = format!("{}/mediabrowser/System/Shutdown", server.url());
    let platform = FakePlatform::running(10);
    let client = Client::new();

    let outcome = ProcessCoordinator::new(&platform, &client, &url)
        .stop(SERVER_PROCESS, ShutdownStrategy::Graceful)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Stopped);
    mock.assert_async().await;
}

#[tokio::test]
async fn slow_exit_is_tolerated() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/shutdown")
        .with_status(200)
        .create_async()
        .await;
    let url = format!("{}/shutdown", server.url());
    let platform = FakePlatform {
        exit_wait: ExitWait::TimedOut,
        ..FakePlatform::running(10)
    };
    let client = Client::new();

    let outcome = ProcessCoordinator::new(&platform, &client, &url)
        .stop(SERVER_PROCESS, ShutdownStrategy::Graceful)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::StillExiting);
}

#[tokio::test]
async fn rejected_shutdown_aborts() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/shutdown")
        .with_status(500)
        .create_async()
        .await;
    let url = format!("{}/shutdown", server.url());
    let platform = FakePlatform::running(10);
    let client = Client::new();

    let err = ProcessCoordinator::new(&platform, &client, &url)
        .stop(SERVER_PROCESS, ShutdownStrategy::Graceful)
        .await
        .unwrap_err();

    assert!(matches!(err, ShutdownError::Request(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_logged_and_skipped() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/shutdown", listener.local_addr().unwrap());
    let platform = FakePlatform::running(10);
    let client = Client::new();

    let outcome = ProcessCoordinator::new(&platform, &client, &url)
        .with_timeouts(ShutdownTimeouts {
            request: Duration::from_millis(100),
            exit_wait: Duration::from_millis(100),
        })
        .stop(SERVER_PROCESS, ShutdownStrategy::Graceful)
        .await
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Unreachable);
    drop(listener);
}

#[tokio::test]
async fn nothing_running_and_shared_hosts_are_left_alone() {
    let client = Client::new();
    let idle = FakePlatform::idle();
    let coordinator = ProcessCoordinator::new(&idle, &client, "http://127.0.0.1:9/");
    assert_eq!(
        coordinator
            .stop(SERVER_PROCESS, ShutdownStrategy::Graceful)
            .await
            .unwrap(),
        ShutdownOutcome::NotRunning
    );

    let busy = FakePlatform::running(5);
    let coordinator = ProcessCoordinator::new(&busy, &client, "http://127.0.0.1:9/");
    assert_eq!(
        coordinator.stop(None, ShutdownStrategy::Leave).await.unwrap(),
        ShutdownOutcome::Skipped
    );
    assert!(busy.terminated.lock().unwrap().is_empty());
}
