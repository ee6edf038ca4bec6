//! Operational endpoint integration tests.
//!
//! Tests `/health`, `/metrics` and unknown paths using the
//! `TestRecordingServer` harness.

use recording_test_utils::{FakePlatform, TestRecordingServer};

#[tokio::test]
async fn test_health_endpoint_returns_json() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");

    // Liveness never touches the platform
    assert_eq!(platform.request_count("/oauth/token").await, 0);

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_returns_text() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    // Generate at least one recorded request first
    reqwest::get(format!("{}/health", server.url())).await?;

    let response = reqwest::get(format!("{}/metrics", server.url())).await?;
    assert_eq!(response.status(), 200);

    // Rendering succeeds even when the handle is not the global recorder
    let _ = response.text().await?;

    Ok(())
}

#[tokio::test]
async fn test_unknown_path_returns_404() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    let response = reqwest::get(format!("{}/api/v1/unknown", server.url())).await?;
    assert_eq!(response.status(), 404);

    Ok(())
}
