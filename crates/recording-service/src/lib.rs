//! Recording Service Library
//!
//! Aggregates meeting recordings across every active user of a
//! communications-platform tenant and serves them as one JSON listing.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> platform API
//! ```
//!
//! A request acquires a platform token, lists the tenant directory, fans
//! out one recordings query per user with bounded concurrency, resolves
//! host identities through a shared cache, then filters the result.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Internal and wire data models
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router and application state
//! - `services` - Platform client and pipeline stages

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod services;
