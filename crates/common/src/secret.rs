//! Secret types for values that must never reach logs.
//!
//! Re-exports [`secrecy`] types. The platform client secret and every bearer
//! token handed out by the token provider are held as [`SecretString`], so a
//! derived `Debug` on any struct carrying them prints `[REDACTED]`.
//!
//! ```rust
//! use common::secret::{bearer_header, SecretString};
//!
//! let token = SecretString::from("abc123");
//! assert_eq!(bearer_header(&token), "Bearer abc123");
//! assert!(!format!("{token:?}").contains("abc123"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Build an `Authorization` header value for a bearer token.
///
/// The returned `String` holds the raw token, so it should go straight into
/// the request builder and not be stored or logged.
#[must_use]
pub fn bearer_header(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
