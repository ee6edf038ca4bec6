//! Observability for the recording service.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
