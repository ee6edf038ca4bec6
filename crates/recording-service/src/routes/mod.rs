//! HTTP routes for the recording service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::errors::RsError;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::{HostDirectoryCache, PlatformApi, PlatformClient};
use axum::{
    error_handling::HandleErrorLayer,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    BoxError, Router,
};
use common::token_manager::TokenProvider;
use metrics_exporter_prometheus::PrometheusHandle;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower::timeout::error::Elapsed;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

/// Slack on top of the aggregation deadline before the request is cut off.
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
///
/// Token and host caches live here for the life of the process.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Platform access token cache.
    pub token_provider: Arc<TokenProvider>,

    /// Platform REST API.
    pub platform: Arc<dyn PlatformApi>,

    /// Host identity cache.
    pub host_directory: Arc<HostDirectoryCache>,
}

impl AppState {
    /// Wire the production platform client and caches from `config`.
    ///
    /// # Errors
    ///
    /// Returns `RsError::Internal` if an HTTP client cannot be built.
    pub fn from_config(config: Config) -> Result<Self, RsError> {
        let token_provider = TokenProvider::new(config.token_manager_config()).map_err(|e| {
            tracing::error!(target: "rs.routes", error = %e, "Failed to create token provider");
            RsError::Internal
        })?;

        let platform: Arc<dyn PlatformApi> = Arc::new(PlatformClient::new(
            &config.platform_api_url,
            config.upstream_http_timeout(),
        )?);

        Ok(Self::with_platform(config, token_provider, platform))
    }

    /// Assemble state around an arbitrary platform implementation.
    pub fn with_platform(
        config: Config,
        token_provider: TokenProvider,
        platform: Arc<dyn PlatformApi>,
    ) -> Self {
        let host_directory = Arc::new(HostDirectoryCache::new(
            Arc::clone(&platform),
            config.host_cache_ttl(),
            config.host_lookup_concurrency,
        ));

        Self {
            config,
            token_provider: Arc::new(token_provider),
            platform,
            host_directory,
        }
    }
}

/// Render a handler panic as a 500 JSON envelope.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");

    tracing::error!(target: "rs.routes", panic = %detail, "Request handler panicked");
    RsError::Internal.into_response()
}

fn timeout_response(err: BoxError, limit: Duration) -> Response {
    if err.is::<Elapsed>() {
        RsError::Timeout(limit).into_response()
    } else {
        tracing::error!(target: "rs.routes", error = %err, "Unhandled middleware error");
        RsError::Internal.into_response()
    }
}

/// Bound every request in `router` to `limit`; expiry renders as a JSON 504.
fn with_request_timeout(router: Router, limit: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                timeout_response(err, limit)
            }))
            .timeout(limit),
    )
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/v1/recordings` - Tenant-wide recordings (and debug modes)
/// - CatchPanicLayer rendering panics as JSON 500s
/// - TraceLayer for request logging
/// - Timeout of the aggregation deadline plus slack, rendered as a JSON 504
/// - HTTP metrics middleware
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let request_timeout = state.config.aggregation_timeout() + REQUEST_TIMEOUT_SLACK;

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/recordings", get(handlers::list_recordings))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. CatchPanicLayer - Convert panics to 500 (innermost)
    // 2. TraceLayer - Log request details
    // 3. Timeout - Bound total request time
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    let app = api_routes
        .merge(metrics_routes)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http());

    with_request_timeout(app, request_timeout)
        .layer(middleware::from_fn(http_metrics_middleware))
}
