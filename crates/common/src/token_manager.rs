//! OAuth 2.0 client-credential token cache.
//!
//! Holds a single bearer credential for the communications platform and
//! refreshes it on demand.
//!
//! # Features
//!
//! - Cached token is reused while it is more than the refresh margin
//!   (30s by default) away from expiry
//! - Refreshes are single-flight: concurrent callers that miss the cache
//!   wait on one exchange instead of each issuing their own
//! - No background task; a refresh happens only when a caller asks
//!
//! # Example
//!
//! ```rust,ignore
//! use common::secret::SecretString;
//! use common::token_manager::{TokenManagerConfig, TokenProvider};
//!
//! let config = TokenManagerConfig::new(
//!     "https://zoom.us/oauth/token".to_string(),
//!     "client-id".to_string(),
//!     SecretString::from("client-secret"),
//! )
//! .with_account_id("account-id".to_string());
//!
//! let provider = TokenProvider::new(config)?;
//! let token = provider.token().await?;
//! ```
//!
//! # Security
//!
//! - Client secret and access token are stored as `SecretString`
//! - Refresh events are logged without values
//! - Error bodies from the token endpoint are logged at trace level only

use crate::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};

// =============================================================================
// Constants
// =============================================================================

/// Default refresh margin: a token this close to expiry is treated as expired.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while obtaining a token.
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// HTTP client error or unexpected status.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the token endpoint (400, 401, 403).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token response parsing failed.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the token provider.
#[derive(Clone)]
pub struct TokenManagerConfig {
    /// Token endpoint URL (e.g., `https://zoom.us/oauth/token`).
    pub token_url: String,

    /// OAuth client ID.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: SecretString,

    /// Account identifier for account-level credential grants.
    pub account_id: Option<String>,

    /// Treat the token as expired this long before its real expiry.
    pub refresh_margin: Duration,

    /// HTTP request timeout.
    pub http_timeout: Duration,
}

impl std::fmt::Debug for TokenManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManagerConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("refresh_margin", &self.refresh_margin)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl TokenManagerConfig {
    /// Create a new configuration with default margin and timeouts.
    #[must_use]
    pub fn new(token_url: String, client_id: String, client_secret: SecretString) -> Self {
        Self {
            token_url,
            client_id,
            client_secret,
            account_id: None,
            refresh_margin: DEFAULT_REFRESH_MARGIN,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Use an account-level grant for the given account.
    #[must_use]
    pub fn with_account_id(mut self, account_id: String) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Set the refresh margin.
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Grant type sent to the token endpoint.
    fn grant_type(&self) -> &'static str {
        if self.account_id.is_some() {
            "account_credentials"
        } else {
            "client_credentials"
        }
    }
}

// =============================================================================
// OAuth Response Types
// =============================================================================

/// OAuth 2.0 token response.
#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: u64,
}

impl std::fmt::Debug for OAuthTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Cached credential.
#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    expires_at_ms: i64,
}

impl CachedToken {
    fn is_fresh(&self, now_ms: i64, margin: Duration) -> bool {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let margin_ms = margin.as_millis() as i64;
        now_ms < self.expires_at_ms - margin_ms
    }
}

// =============================================================================
// Token Provider
// =============================================================================

/// Process-wide bearer credential cache.
///
/// Construct once at startup and share behind an `Arc`.
pub struct TokenProvider {
    config: TokenManagerConfig,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenProvider")
            .field("config", &self.config)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Create a provider with an empty cache.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the HTTP client cannot be built.
    pub fn new(config: TokenManagerConfig) -> Result<Self, TokenError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Get a valid bearer token, exchanging credentials if the cached one
    /// is missing or inside the refresh margin.
    ///
    /// # Errors
    ///
    /// Returns the `TokenError` of the failed exchange. A failed exchange
    /// leaves the previous cache contents untouched.
    #[instrument(skip_all, name = "common.token_manager.token")]
    pub async fn token(&self) -> Result<SecretString, TokenError> {
        if let Some(token) = self.cached().await {
            trace!(target: "common.token_manager", "Using cached token");
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.cached().await {
            return Ok(token);
        }

        let had_token = self.cache.read().await.is_some();
        let (token, expires_at_ms) = acquire_token(&self.config, &self.http_client).await?;

        *self.cache.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at_ms,
        });

        if had_token {
            debug!(
                target: "common.token_manager",
                client_id = %self.config.client_id,
                "Token refreshed"
            );
        } else {
            info!(
                target: "common.token_manager",
                client_id = %self.config.client_id,
                "Initial token acquired"
            );
        }

        Ok(token)
    }

    async fn cached(&self) -> Option<SecretString> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|cached| cached.is_fresh(now_ms, self.config.refresh_margin))
            .map(|cached| cached.token.clone())
    }
}

/// Exchange client credentials for a token.
///
/// Returns the token and its expiration time (Unix epoch milliseconds).
#[instrument(skip_all)]
async fn acquire_token(
    config: &TokenManagerConfig,
    http_client: &reqwest::Client,
) -> Result<(SecretString, i64), TokenError> {
    debug!(
        target: "common.token_manager",
        client_id = %config.client_id,
        url = %config.token_url,
        "Requesting token"
    );

    let mut form_body: Vec<(&str, &str)> = vec![("grant_type", config.grant_type())];
    if let Some(account_id) = config.account_id.as_deref() {
        form_body.push(("account_id", account_id));
    }

    let response = http_client
        .post(&config.token_url)
        .basic_auth(&config.client_id, Some(config.client_secret.expose_secret()))
        .form(&form_body)
        .send()
        .await
        .map_err(|e| {
            debug!(target: "common.token_manager", error = %e, "HTTP request failed");
            TokenError::HttpError(e.to_string())
        })?;

    let status = response.status();

    if status.is_success() {
        let token_response: OAuthTokenResponse = response.json().await.map_err(|e| {
            warn!(target: "common.token_manager", error = %e, "Failed to parse token response");
            TokenError::InvalidResponse(e.to_string())
        })?;

        if token_response.access_token.is_empty() {
            return Err(TokenError::InvalidResponse(
                "access_token is empty".to_string(),
            ));
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        #[allow(clippy::cast_possible_wrap)]
        let expires_at_ms = now_ms + (token_response.expires_in as i64).saturating_mul(1000);

        debug!(
            target: "common.token_manager",
            expires_in_secs = token_response.expires_in,
            "Token acquired"
        );

        Ok((SecretString::from(token_response.access_token), expires_at_ms))
    } else if matches!(status.as_u16(), 400 | 401 | 403) {
        let body = response.text().await.unwrap_or_else(|e| {
            trace!(target: "common.token_manager", error = %e, "Failed to read error response body");
            "<failed to read body>".to_string()
        });
        warn!(
            target: "common.token_manager",
            status = %status,
            "Credentials rejected by token endpoint"
        );
        trace!(
            target: "common.token_manager",
            body = %body,
            "Token endpoint rejection body"
        );
        Err(TokenError::AuthenticationRejected(format!("Status {status}")))
    } else {
        warn!(
            target: "common.token_manager",
            status = %status,
            "Unexpected response from token endpoint"
        );
        Err(TokenError::HttpError(format!("Unexpected status: {status}")))
    }
}

// =============================================================================
// Tests
// =============================================================================
