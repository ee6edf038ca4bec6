//! Recording service configuration.
//!
//! Configuration is loaded from environment variables. The platform client
//! secret is redacted in Debug output.

use common::secret::SecretString;
use common::token_manager::TokenManagerConfig;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default platform REST API base URL.
pub const DEFAULT_PLATFORM_API_URL: &str = "https://api.zoom.us/v2";

/// Default platform token endpoint.
pub const DEFAULT_PLATFORM_TOKEN_URL: &str = "https://zoom.us/oauth/token";

/// Default number of concurrent per-user recordings fetches.
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 5;

/// Upper bound on fan-out concurrency (upstream rate limits).
pub const MAX_FANOUT_CONCURRENCY: usize = 50;

/// Default wall-clock budget for one aggregation.
pub const DEFAULT_AGGREGATION_TIMEOUT_SECONDS: u64 = 120;

/// Default host identity cache TTL. Zero disables expiry.
pub const DEFAULT_HOST_CACHE_TTL_SECONDS: u64 = 3600;

/// Default number of parallel host lookups during prewarm.
pub const DEFAULT_HOST_LOOKUP_CONCURRENCY: usize = 10;

/// Default timeout for a single upstream HTTP call.
pub const DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECONDS: u64 = 15;

/// Recording service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Platform REST API base URL.
    pub platform_api_url: String,

    /// Platform OAuth token endpoint.
    pub platform_token_url: String,

    /// Account id for account-level credential grants.
    pub platform_account_id: Option<String>,

    /// OAuth client id.
    pub platform_client_id: String,

    /// OAuth client secret.
    pub platform_client_secret: SecretString,

    /// Concurrent per-user recordings fetches.
    pub fanout_concurrency: usize,

    /// Deadline for a whole aggregation, in seconds.
    pub aggregation_timeout_seconds: u64,

    /// Host identity cache TTL in seconds; 0 means entries never expire.
    pub host_cache_ttl_seconds: u64,

    /// Parallel host lookups during prewarm.
    pub host_lookup_concurrency: usize,

    /// Timeout for one upstream HTTP call, in seconds.
    pub upstream_http_timeout_seconds: u64,

    /// Connection drain period on shutdown, in seconds.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("platform_api_url", &self.platform_api_url)
            .field("platform_token_url", &self.platform_token_url)
            .field("platform_account_id", &self.platform_account_id)
            .field("platform_client_id", &self.platform_client_id)
            .field("platform_client_secret", &"[REDACTED]")
            .field("fanout_concurrency", &self.fanout_concurrency)
            .field(
                "aggregation_timeout_seconds",
                &self.aggregation_timeout_seconds,
            )
            .field("host_cache_ttl_seconds", &self.host_cache_ttl_seconds)
            .field("host_lookup_concurrency", &self.host_lookup_concurrency)
            .field(
                "upstream_http_timeout_seconds",
                &self.upstream_http_timeout_seconds,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Parse an optional positive integer, falling back to `default`.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    allow_zero: bool,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.trim().parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{}': {}", value_str, e),
    })?;

    if !allow_zero && value == T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            vars.get(name)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let platform_client_id = required("PLATFORM_CLIENT_ID")?;
        let platform_client_secret = SecretString::from(required("PLATFORM_CLIENT_SECRET")?);

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let platform_api_url = vars
            .get("PLATFORM_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PLATFORM_API_URL.to_string());

        let platform_token_url = vars
            .get("PLATFORM_TOKEN_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PLATFORM_TOKEN_URL.to_string());

        let platform_account_id = vars
            .get("PLATFORM_ACCOUNT_ID")
            .filter(|v| !v.is_empty())
            .cloned();

        let fanout_concurrency = parse_positive(
            vars,
            "FANOUT_CONCURRENCY",
            DEFAULT_FANOUT_CONCURRENCY,
            false,
        )?;
        if fanout_concurrency > MAX_FANOUT_CONCURRENCY {
            return Err(ConfigError::InvalidValue {
                name: "FANOUT_CONCURRENCY".to_string(),
                reason: format!(
                    "must not exceed {}, got {}",
                    MAX_FANOUT_CONCURRENCY, fanout_concurrency
                ),
            });
        }

        let aggregation_timeout_seconds = parse_positive(
            vars,
            "AGGREGATION_TIMEOUT_SECONDS",
            DEFAULT_AGGREGATION_TIMEOUT_SECONDS,
            false,
        )?;

        let host_cache_ttl_seconds = parse_positive(
            vars,
            "HOST_CACHE_TTL_SECONDS",
            DEFAULT_HOST_CACHE_TTL_SECONDS,
            true,
        )?;

        let host_lookup_concurrency = parse_positive(
            vars,
            "HOST_LOOKUP_CONCURRENCY",
            DEFAULT_HOST_LOOKUP_CONCURRENCY,
            false,
        )?;

        let upstream_http_timeout_seconds = parse_positive(
            vars,
            "UPSTREAM_HTTP_TIMEOUT_SECONDS",
            DEFAULT_UPSTREAM_HTTP_TIMEOUT_SECONDS,
            false,
        )?;

        let drain_seconds = parse_positive(vars, "DRAIN_SECONDS", 0, true)?;

        Ok(Config {
            bind_address,
            platform_api_url,
            platform_token_url,
            platform_account_id,
            platform_client_id,
            platform_client_secret,
            fanout_concurrency,
            aggregation_timeout_seconds,
            host_cache_ttl_seconds,
            host_lookup_concurrency,
            upstream_http_timeout_seconds,
            drain_seconds,
        })
    }

    /// Token provider settings derived from this configuration.
    pub fn token_manager_config(&self) -> TokenManagerConfig {
        let config = TokenManagerConfig::new(
            self.platform_token_url.clone(),
            self.platform_client_id.clone(),
            self.platform_client_secret.clone(),
        )
        .with_http_timeout(self.upstream_http_timeout());

        match &self.platform_account_id {
            Some(account_id) => config.with_account_id(account_id.clone()),
            None => config,
        }
    }

    pub fn aggregation_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation_timeout_seconds)
    }

    /// `None` when entries never expire.
    pub fn host_cache_ttl(&self) -> Option<Duration> {
        (self.host_cache_ttl_seconds > 0).then(|| Duration::from_secs(self.host_cache_ttl_seconds))
    }

    pub fn upstream_http_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_http_timeout_seconds)
    }
}
