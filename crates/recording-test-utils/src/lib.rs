//! # Recording Test Utilities
//!
//! Shared test utilities for the recording service.
//!
//! This crate provides:
//! - Fake communications platform (`FakePlatform`, wiremock-backed)
//! - Server test harness (`TestRecordingServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use recording_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let platform = FakePlatform::start().await;
//!     platform.mount_token().await;
//!     platform.mount_users(vec![user_json("u1", "a@example.com", "Ada", "")]).await;
//!     platform.mount_recordings("u1", vec![]).await;
//!
//!     let server = TestRecordingServer::spawn(&platform).await?;
//!     let response = reqwest::get(format!("{}/api/v1/recordings", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fake_platform;
pub mod server_harness;

// Re-export commonly used items
pub use fake_platform::*;
pub use server_harness::*;
