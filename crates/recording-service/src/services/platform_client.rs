//! Communications platform HTTP client.
//!
//! Wraps the four upstream surfaces the service consumes:
//!
//! - `GET /users?status=active` (paginated directory)
//! - `GET /users/{id}/recordings` (per-user recordings, paginated)
//! - `GET /users/{id}` (single-user lookup)
//!
//! and the token endpoint via [`common::token_manager`]. Responses are
//! normalized into strict models before leaving this module.

use crate::errors::RsError;
use crate::models::wire::{WireRecordingsPage, WireUserProfile, WireUsersPage};
use crate::models::{DateRange, RecordingsPage, UserProfile, UsersPage};
use common::error::UpstreamError;
use common::secret::{bearer_header, SecretString};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Directory page size (platform maximum).
pub const USERS_PAGE_SIZE: u32 = 300;

/// Recordings page size.
pub const RECORDINGS_PAGE_SIZE: u32 = 50;

/// Default connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Trait for platform operations (enables mocking).
#[async_trait::async_trait]
pub trait PlatformApi: Send + Sync {
    /// Fetch one page of active users.
    async fn list_users_page(
        &self,
        token: &SecretString,
        page_token: Option<&str>,
    ) -> Result<UsersPage, UpstreamError>;

    /// Fetch one page of a user's recordings within `range`.
    async fn list_user_recordings_page(
        &self,
        token: &SecretString,
        user_id: &str,
        range: &DateRange,
        page_token: Option<&str>,
    ) -> Result<RecordingsPage, UpstreamError>;

    /// Look up a single user by id.
    async fn get_user(&self, token: &SecretString, user_id: &str)
        -> Result<UserProfile, UpstreamError>;
}

/// Error body returned by the platform on non-2xx responses.
#[derive(Debug, Deserialize)]
struct PlatformErrorBody {
    message: Option<String>,
}

/// reqwest-backed [`PlatformApi`].
#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: Url,
}

impl PlatformClient {
    /// Create a new platform client.
    ///
    /// # Errors
    ///
    /// Returns `RsError::Internal` if the HTTP client cannot be built or
    /// `base_url` is not an absolute http(s) URL.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RsError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                error!(
                    target: "rs.services.platform_client",
                    base_url = %base_url,
                    "Invalid platform base URL"
                );
                RsError::Internal
            })?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "rs.services.platform_client", error = %e, "Failed to build HTTP client");
                RsError::Internal
            })?;

        Ok(Self { client, base_url })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path
    /// segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                UpstreamError::Transport("platform base URL cannot carry a path".to_string())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &SecretString,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer_header(token))
            .query(query)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "rs.services.platform_client", error = %e, path = %path, "Platform request failed");
                UpstreamError::Transport(e.to_string())
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<PlatformErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unexpected status")
                        .to_string()
                });
            debug!(
                target: "rs.services.platform_client",
                status = %status,
                path = %path,
                "Platform returned error status"
            );
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(target: "rs.services.platform_client", error = %e, path = %path, "Failed to parse platform response");
            UpstreamError::Malformed(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl PlatformApi for PlatformClient {
    #[instrument(skip_all, fields(has_page_token = page_token.is_some()))]
    async fn list_users_page(
        &self,
        token: &SecretString,
        page_token: Option<&str>,
    ) -> Result<UsersPage, UpstreamError> {
        let mut query = vec![
            ("status", "active".to_string()),
            ("page_size", USERS_PAGE_SIZE.to_string()),
        ];
        if let Some(page_token) = page_token {
            query.push(("next_page_token", page_token.to_string()));
        }

        let page: WireUsersPage = self.get_json(token, &["users"], &query).await?;
        Ok(page.normalize())
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn list_user_recordings_page(
        &self,
        token: &SecretString,
        user_id: &str,
        range: &DateRange,
        page_token: Option<&str>,
    ) -> Result<RecordingsPage, UpstreamError> {
        let mut query = vec![
            ("from", range.from_param()),
            ("to", range.to_param()),
            ("page_size", RECORDINGS_PAGE_SIZE.to_string()),
        ];
        if let Some(page_token) = page_token {
            query.push(("next_page_token", page_token.to_string()));
        }

        let page: WireRecordingsPage = self
            .get_json(token, &["users", user_id, "recordings"], &query)
            .await?;
        Ok(page.normalize())
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn get_user(
        &self,
        token: &SecretString,
        user_id: &str,
    ) -> Result<UserProfile, UpstreamError> {
        let profile: WireUserProfile = self
            .get_json(token, &["users", user_id], &[])
            .await?;
        Ok(profile.normalize())
    }
}

/// Mock platform module for testing.
///
/// Deterministic in-memory [`PlatformApi`] with call accounting, used by
/// unit tests to check fan-out bounds and cache behavior without HTTP.
pub mod mock {
    use super::*;
    use crate::models::{RecordedMeeting, TenantUser};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock platform for unit testing.
    #[derive(Default)]
    pub struct MockPlatform {
        users: Vec<TenantUser>,
        recordings: HashMap<String, Result<Vec<RecordedMeeting>, UpstreamError>>,
        profiles: HashMap<String, UserProfile>,
        directory_failure: Option<UpstreamError>,
        users_page_size: Option<usize>,
        recordings_page_size: Option<usize>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        users_calls: AtomicUsize,
        recordings_calls: AtomicUsize,
        lookup_calls: Mutex<HashMap<String, usize>>,
    }

    impl MockPlatform {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a user whose recordings query succeeds with `meetings`.
        pub fn with_user(mut self, user: TenantUser, meetings: Vec<RecordedMeeting>) -> Self {
            self.recordings.insert(user.id.clone(), Ok(meetings));
            self.users.push(user);
            self
        }

        /// Add a user whose recordings query fails with `error`.
        pub fn with_failing_user(mut self, user: TenantUser, error: UpstreamError) -> Self {
            self.recordings.insert(user.id.clone(), Err(error));
            self.users.push(user);
            self
        }

        /// Register a profile for single-user lookups. Unregistered ids 404.
        pub fn with_profile(mut self, user_id: &str, profile: UserProfile) -> Self {
            self.profiles.insert(user_id.to_string(), profile);
            self
        }

        pub fn with_directory_failure(mut self, error: UpstreamError) -> Self {
            self.directory_failure = Some(error);
            self
        }

        pub fn with_users_page_size(mut self, size: usize) -> Self {
            self.users_page_size = Some(size.max(1));
            self
        }

        pub fn with_recordings_page_size(mut self, size: usize) -> Self {
            self.recordings_page_size = Some(size.max(1));
            self
        }

        /// Delay every recordings fetch so workers overlap.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn users(&self) -> Vec<TenantUser> {
            self.users.clone()
        }

        /// Highest number of recordings fetches observed in flight at once.
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub fn users_calls(&self) -> usize {
            self.users_calls.load(Ordering::SeqCst)
        }

        pub fn recordings_calls(&self) -> usize {
            self.recordings_calls.load(Ordering::SeqCst)
        }

        pub fn lookup_calls(&self, user_id: &str) -> usize {
            self.lookup_calls
                .lock()
                .map(|calls| calls.get(user_id).copied().unwrap_or(0))
                .unwrap_or(0)
        }

        pub fn total_lookup_calls(&self) -> usize {
            self.lookup_calls
                .lock()
                .map(|calls| calls.values().sum())
                .unwrap_or(0)
        }
    }

    /// Slice one page out of `items` starting at the offset encoded in
    /// `page_token`.
    fn paginate<T: Clone>(
        items: &[T],
        page_size: Option<usize>,
        page_token: Option<&str>,
    ) -> (Vec<T>, Option<String>) {
        let start = page_token.and_then(|t| t.parse().ok()).unwrap_or(0usize);
        let size = page_size.unwrap_or(items.len().max(1));
        let end = (start + size).min(items.len());
        let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next = (end < items.len()).then(|| end.to_string());
        (page, next)
    }

    #[async_trait::async_trait]
    impl PlatformApi for MockPlatform {
        async fn list_users_page(
            &self,
            _token: &SecretString,
            page_token: Option<&str>,
        ) -> Result<UsersPage, UpstreamError> {
            self.users_calls.fetch_add(1, Ordering::SeqCst);

            if let Some(error) = &self.directory_failure {
                return Err(error.clone());
            }

            let (users, next_page_token) =
                paginate(&self.users, self.users_page_size, page_token);
            Ok(UsersPage {
                users,
                next_page_token,
            })
        }

        async fn list_user_recordings_page(
            &self,
            _token: &SecretString,
            user_id: &str,
            _range: &DateRange,
            page_token: Option<&str>,
        ) -> Result<RecordingsPage, UpstreamError> {
            self.recordings_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let result = match self.recordings.get(user_id) {
                Some(Ok(meetings)) => {
                    let (meetings, next_page_token) =
                        paginate(meetings, self.recordings_page_size, page_token);
                    Ok(RecordingsPage {
                        meetings,
                        next_page_token,
                    })
                }
                Some(Err(error)) => Err(error.clone()),
                None => Err(UpstreamError::Status {
                    status: 404,
                    message: "User does not exist".to_string(),
                }),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn get_user(
            &self,
            _token: &SecretString,
            user_id: &str,
        ) -> Result<UserProfile, UpstreamError> {
            if let Ok(mut calls) = self.lookup_calls.lock() {
                *calls.entry(user_id.to_string()).or_insert(0) += 1;
            }

            self.profiles
                .get(user_id)
                .cloned()
                .ok_or_else(|| UpstreamError::Status {
                    status: 404,
                    message: "User does not exist".to_string(),
                })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> SecretString {
        SecretString::from("test-token")
    }

    fn range() -> DateRange {
        DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        }
    }

    fn client(server: &MockServer) -> PlatformClient {
        PlatformClient::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_list_users_page_sends_filters_and_bearer() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("status", "active"))
            .and(query_param("page_size", "300"))
            .and(query_param("next_page_token", "tok-2"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "next_page_token": "",
                "users": [{"id": "u1", "email": "a@example.com"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .list_users_page(&token(), Some("tok-2"))
            .await
            .unwrap();

        assert_eq!(page.users.len(), 1);
        assert_eq!(page.next_page_token, None);
    }

    #[tokio::test]
    async fn test_list_user_recordings_page_sends_range() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/u1/recordings"))
            .and(query_param("from", "2024-05-01"))
            .and(query_param("to", "2024-05-31"))
            .and(query_param("page_size", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meetings": [{"uuid": "m1", "topic": "Standup", "host_id": "h1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .list_user_recordings_page(&token(), "u1", &range(), None)
            .await
            .unwrap();

        assert_eq!(page.meetings.len(), 1);
        assert_eq!(page.meetings[0].topic, "Standup");
    }

    #[tokio::test]
    async fn test_ids_are_encoded_as_single_path_segments() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/a%2Fb%3Fc%23d/recordings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "meetings": []
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/h%2F1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "first_name": "Ada", "last_name": "L", "email": "ada@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let page = client
            .list_user_recordings_page(&token(), "a/b?c#d", &range(), None)
            .await
            .unwrap();
        assert!(page.meetings.is_empty());

        let profile = client.get_user(&token(), "h/1").await.unwrap();
        assert_eq!(profile.email, "ada@example.com");
    }

    #[test]
    fn test_base_url_path_prefix_is_kept() {
        let client = PlatformClient::new("https://api.example.com/v2/", Duration::from_secs(1))
            .unwrap();
        let url = client.endpoint(&["users", "u1"]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/users/u1");
    }

    #[test]
    fn test_relative_base_url_is_rejected() {
        assert!(PlatformClient::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_error_status_carries_platform_message() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": 1001,
                "message": "User does not exist: gone."
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_user(&token(), "gone").await.unwrap_err();

        assert_eq!(
            err,
            UpstreamError::Status {
                status: 404,
                message: "User does not exist: gone.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_status_without_body_uses_reason() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/u1/recordings"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_user_recordings_page(&token(), "u1", &range(), None)
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), Some(500));
        assert_eq!(err.message(), "Internal Server Error");
    }

    #[tokio::test]
    async fn test_non_json_success_body_is_malformed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/u1/recordings"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_user_recordings_page(&token(), "u1", &range(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_get_user_normalizes_profile() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users/h1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "h1",
                "first_name": "Grace",
                "last_name": "Hopper",
                "email": "grace@example.com"
            })))
            .mount(&server)
            .await;

        let profile = client(&server).get_user(&token(), "h1").await.unwrap();

        assert_eq!(profile.first_name, "Grace");
        assert_eq!(profile.email, "grace@example.com");
    }

    #[tokio::test]
    async fn test_unreachable_platform_is_transport_error() {
        let client = PlatformClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();

        let err = client.get_user(&token(), "h1").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_)));
    }

    mod mock_tests {
        use super::super::mock::MockPlatform;
        use super::*;
        use crate::models::TenantUser;

        fn user(id: &str) -> TenantUser {
            TenantUser {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                first_name: String::new(),
                last_name: String::new(),
                status: "active".to_string(),
                user_type: "1".to_string(),
            }
        }

        #[tokio::test]
        async fn test_mock_paginates_users() {
            let mock = MockPlatform::new()
                .with_user(user("a"), vec![])
                .with_user(user("b"), vec![])
                .with_user(user("c"), vec![])
                .with_users_page_size(2);

            let first = mock.list_users_page(&token(), None).await.unwrap();
            assert_eq!(first.users.len(), 2);
            assert_eq!(first.next_page_token.as_deref(), Some("2"));

            let second = mock.list_users_page(&token(), Some("2")).await.unwrap();
            assert_eq!(second.users.len(), 1);
            assert_eq!(second.next_page_token, None);
            assert_eq!(mock.users_calls(), 2);
        }

        #[tokio::test]
        async fn test_mock_unknown_profile_is_404() {
            let mock = MockPlatform::new();
            let err = mock.get_user(&token(), "nobody").await.unwrap_err();

            assert_eq!(err.http_status(), Some(404));
            assert_eq!(mock.lookup_calls("nobody"), 1);
        }
    }
}
