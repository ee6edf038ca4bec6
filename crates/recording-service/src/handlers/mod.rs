//! HTTP request handlers for the recording service.

pub mod health;
pub mod metrics;
pub mod recordings;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use recordings::list_recordings;
