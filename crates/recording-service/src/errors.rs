//! Recording service error types.
//!
//! Only whole-request failures live here. Per-user failures never become an
//! `RsError`; they are collected as `AggregationError` entries instead.
//! Every variant renders as a JSON envelope `{"error": {"code", "message"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::token_manager::TokenError;
use serde::Serialize;
use thiserror::Error;

/// Recording service error type.
///
/// Maps to HTTP status codes:
/// - Auth, Directory: 502 Bad Gateway (the platform failed us)
/// - BadRequest: 400 Bad Request
/// - Timeout: 504 Gateway Timeout
/// - Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RsError {
    #[error("Platform authentication failed: {0}")]
    Auth(String),

    #[error("User directory enumeration failed: {message}")]
    Directory {
        status: Option<u16>,
        message: String,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request did not complete within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Internal server error")]
    Internal,
}

impl RsError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RsError::Auth(_) | RsError::Directory { .. } => 502,
            RsError::BadRequest(_) => 400,
            RsError::Timeout(_) => 504,
            RsError::Internal => 500,
        }
    }
}

impl From<TokenError> for RsError {
    fn from(err: TokenError) -> Self {
        RsError::Auth(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
}

impl IntoResponse for RsError {
    fn into_response(self) -> Response {
        let (status, code, message, upstream_status) = match &self {
            RsError::Auth(reason) => {
                tracing::error!(target: "rs.errors", reason = %reason, "Platform authentication failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "AUTH_FAILED",
                    self.to_string(),
                    None,
                )
            }
            RsError::Directory { status, message } => {
                tracing::error!(
                    target: "rs.errors",
                    upstream_status = ?status,
                    message = %message,
                    "User directory enumeration failed"
                );
                (
                    StatusCode::BAD_GATEWAY,
                    "DIRECTORY_FAILED",
                    self.to_string(),
                    *status,
                )
            }
            RsError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone(), None)
            }
            RsError::Timeout(limit) => {
                tracing::warn!(
                    target: "rs.errors",
                    limit_ms = limit.as_millis() as u64,
                    "Request timed out"
                );
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "REQUEST_TIMEOUT",
                    self.to_string(),
                    None,
                )
            }
            RsError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                upstream_status,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_display() {
        assert_eq!(
            RsError::Auth("Status 401".to_string()).to_string(),
            "Platform authentication failed: Status 401"
        );
        assert_eq!(
            RsError::Directory {
                status: Some(503),
                message: "unavailable".to_string()
            }
            .to_string(),
            "User directory enumeration failed: unavailable"
        );
        assert_eq!(RsError::Internal.to_string(), "Internal server error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(RsError::Auth("x".to_string()).status_code(), 502);
        assert_eq!(
            RsError::Directory {
                status: None,
                message: "x".to_string()
            }
            .status_code(),
            502
        );
        assert_eq!(RsError::BadRequest("x".to_string()).status_code(), 400);
        assert_eq!(
            RsError::Timeout(std::time::Duration::from_secs(1)).status_code(),
            504
        );
        assert_eq!(RsError::Internal.status_code(), 500);
    }

    #[test]
    fn test_from_token_error() {
        let err: RsError = TokenError::AuthenticationRejected("Status 401".to_string()).into();
        assert!(matches!(err, RsError::Auth(msg) if msg.contains("Status 401")));
    }

    #[tokio::test]
    async fn test_into_response_auth() {
        let response = RsError::Auth("Status 401".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "AUTH_FAILED");
        assert!(body["error"].get("upstreamStatus").is_none());
    }

    #[tokio::test]
    async fn test_into_response_directory_carries_upstream_status() {
        let response = RsError::Directory {
            status: Some(429),
            message: "Too many requests".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "DIRECTORY_FAILED");
        assert_eq!(body["error"]["upstreamStatus"], 429);
    }

    #[tokio::test]
    async fn test_into_response_bad_request() {
        let response = RsError::BadRequest("invalid 'from' date".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "invalid 'from' date");
    }

    #[tokio::test]
    async fn test_into_response_internal() {
        let response = RsError::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }
}
