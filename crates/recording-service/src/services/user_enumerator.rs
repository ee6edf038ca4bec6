//! Tenant directory enumeration.
//!
//! Not partial-failure tolerant: without the full user set there is no
//! meaningful tenant-wide result, so any page failure aborts the request.

use crate::errors::RsError;
use crate::models::TenantUser;
use crate::services::platform_client::PlatformApi;
use common::secret::SecretString;
use tracing::{debug, instrument, warn};

/// Safety cap on directory pages (300 users each).
pub const MAX_DIRECTORY_PAGES: usize = 1000;

/// List every active user of the tenant, following continuation tokens
/// until the platform returns an empty one.
///
/// # Errors
///
/// `RsError::Directory` if any page fails or the page cap is exceeded.
#[instrument(skip_all, name = "rs.services.list_active_users")]
pub async fn list_active_users(
    api: &dyn PlatformApi,
    token: &SecretString,
) -> Result<Vec<TenantUser>, RsError> {
    let mut users = Vec::new();
    let mut page_token: Option<String> = None;

    for page_number in 1..=MAX_DIRECTORY_PAGES {
        let page = api
            .list_users_page(token, page_token.as_deref())
            .await
            .map_err(|e| {
                warn!(
                    target: "rs.services.user_enumerator",
                    page = page_number,
                    error = %e,
                    "Directory page fetch failed"
                );
                RsError::Directory {
                    status: e.http_status(),
                    message: e.message(),
                }
            })?;

        debug!(
            target: "rs.services.user_enumerator",
            page = page_number,
            users = page.users.len(),
            "Fetched directory page"
        );
        users.extend(page.users);

        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => return Ok(users),
        }
    }

    Err(RsError::Directory {
        status: None,
        message: format!("directory exceeded {MAX_DIRECTORY_PAGES} pages"),
    })
}
