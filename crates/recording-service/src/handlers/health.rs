//! Liveness probe.

use crate::models::HealthResponse;
use axum::Json;
use tracing::instrument;

/// Health check handler.
///
/// Reports liveness only; upstream reachability is exercised by real
/// requests and surfaces as 502s there.
#[instrument(skip_all, name = "rs.health.check")]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_reports_healthy() {
        let Json(response) = health_check().await;
        assert_eq!(response.status, "healthy");
    }
}
