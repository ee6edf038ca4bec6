//! Common utilities shared by the recording aggregation crates.

#![warn(clippy::pedantic)]

/// Module for upstream call errors
pub mod error;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for OAuth 2.0 client-credential token caching
pub mod token_manager;
