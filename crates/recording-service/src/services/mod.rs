//! Service layer for the recording service.
//!
//! # Components
//!
//! - `platform_client` - HTTP client for the communications platform
//! - `user_enumerator` - Paginated tenant directory listing
//! - `fanout` - Bounded per-user recordings aggregation
//! - `host_directory` - Shared host identity cache
//! - `enricher` - Host name/email attachment
//! - `filter` - Owner/topic/free-text filtering

pub mod enricher;
pub mod fanout;
pub mod filter;
pub mod host_directory;
pub mod platform_client;
pub mod user_enumerator;

pub use fanout::{aggregate, AggregationOutcome, FanoutOptions};
pub use filter::RecordingFilter;
pub use host_directory::HostDirectoryCache;
pub use platform_client::{PlatformApi, PlatformClient};
