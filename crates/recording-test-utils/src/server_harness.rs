//! Test server harness for E2E testing
//!
//! Provides `TestRecordingServer` for spawning real recording service
//! instances wired to a [`FakePlatform`].

use crate::fake_platform::FakePlatform;
use metrics_exporter_prometheus::PrometheusBuilder;
use recording_service::config::Config;
use recording_service::observability::metrics::init_metrics_recorder;
use recording_service::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the recording service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let platform = FakePlatform::start().await;
/// let server = TestRecordingServer::spawn(&platform).await?;
///
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestRecordingServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestRecordingServer {
    /// Spawn a server against `platform` with default settings.
    pub async fn spawn(platform: &FakePlatform) -> Result<Self, anyhow::Error> {
        Self::spawn_with(platform, &[]).await
    }

    /// Spawn a server against `platform`, overriding environment values.
    ///
    /// The server will:
    /// - Point its API and token URLs at the fake platform
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    pub async fn spawn_with(
        platform: &FakePlatform,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("PLATFORM_API_URL".to_string(), platform.uri()),
            ("PLATFORM_TOKEN_URL".to_string(), platform.token_url()),
            ("PLATFORM_CLIENT_ID".to_string(), "test-client".to_string()),
            (
                "PLATFORM_CLIENT_SECRET".to_string(),
                "test-secret".to_string(),
            ),
            ("UPSTREAM_HTTP_TIMEOUT_SECONDS".to_string(), "5".to_string()),
        ]);
        for (name, value) in overrides {
            vars.insert((*name).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::from_config(config.clone())
                .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?,
        );

        // Only one recorder can be installed per process; later servers get
        // a standalone handle.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestRecordingServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_spawns_successfully() -> Result<(), anyhow::Error> {
        let platform = FakePlatform::start().await;
        let server = TestRecordingServer::spawn(&platform).await?;

        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["status"], "healthy");

        Ok(())
    }

    #[tokio::test]
    async fn test_overrides_reach_config() -> Result<(), anyhow::Error> {
        let platform = FakePlatform::start().await;
        let server =
            TestRecordingServer::spawn_with(&platform, &[("FANOUT_CONCURRENCY", "7")]).await?;

        assert_eq!(server.config().fanout_concurrency, 7);
        assert_eq!(server.config().platform_api_url, platform.uri());

        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_servers_different_ports() -> Result<(), anyhow::Error> {
        let platform = FakePlatform::start().await;
        let server1 = TestRecordingServer::spawn(&platform).await?;
        let server2 = TestRecordingServer::spawn(&platform).await?;

        assert_ne!(server1.addr(), server2.addr());

        Ok(())
    }
}
