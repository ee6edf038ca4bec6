//! Fake communications platform for E2E tests.
//!
//! A `wiremock` server that speaks the platform's token, directory,
//! recordings and user-lookup endpoints. Tests mount only the responses
//! they need; unmatched requests get wiremock's default 404.

use serde_json::{json, Value};
use wiremock::matchers::{method, path, path_regex, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the token endpoint on the fake platform.
pub const TOKEN_PATH: &str = "/oauth/token";

/// Access token issued by [`FakePlatform::mount_token`].
pub const FAKE_ACCESS_TOKEN: &str = "fake-platform-token";

/// Build a directory user payload.
pub fn user_json(id: &str, email: &str, first_name: &str, last_name: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "first_name": first_name,
        "last_name": last_name,
        "status": "active",
        "type": 1
    })
}

/// Build a recorded meeting payload (duration in minutes, one MP4 file).
pub fn meeting_json(uuid: &str, topic: &str, host_id: &str) -> Value {
    json!({
        "uuid": uuid,
        "id": 81234567890u64,
        "topic": topic,
        "host_id": host_id,
        "start_time": "2024-05-02T15:00:00Z",
        "duration": 30,
        "recording_files": [{
            "id": format!("{uuid}-file"),
            "file_type": "MP4",
            "file_extension": "MP4",
            "file_size": 1048576,
            "recording_start": "2024-05-02T15:00:05Z",
            "recording_end": "2024-05-02T15:29:55Z",
            "download_url": format!("https://files.example.com/{uuid}"),
            "status": "completed"
        }]
    })
}

/// Build a single-user lookup payload.
pub fn profile_json(first_name: &str, last_name: &str, email: &str) -> Value {
    json!({
        "first_name": first_name,
        "last_name": last_name,
        "email": email
    })
}

/// Wiremock-backed platform.
pub struct FakePlatform {
    server: MockServer,
}

impl FakePlatform {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL for the REST API.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Full token endpoint URL.
    pub fn token_url(&self) -> String {
        format!("{}{}", self.server.uri(), TOKEN_PATH)
    }

    /// Underlying server, for custom mocks.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Token endpoint issuing [`FAKE_ACCESS_TOKEN`] for an hour.
    pub async fn mount_token(&self) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": FAKE_ACCESS_TOKEN,
                "token_type": "bearer",
                "expires_in": 3600,
                "scope": "user:read:admin recording:read:admin"
            })))
            .mount(&self.server)
            .await;
    }

    /// Token endpoint rejecting every grant with `status`.
    pub async fn mount_token_failure(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "reason": "Invalid client_id or client_secret",
                "error": "invalid_client"
            })))
            .mount(&self.server)
            .await;
    }

    /// Single-page directory.
    pub async fn mount_users(&self, users: Vec<Value>) {
        self.mount_users_pages(vec![users]).await;
    }

    /// Multi-page directory; page `i > 0` is requested with token `page-i`.
    pub async fn mount_users_pages(&self, pages: Vec<Vec<Value>>) {
        let page_count = pages.len();
        for (i, users) in pages.into_iter().enumerate() {
            let next = if i + 1 < page_count {
                format!("page-{}", i + 1)
            } else {
                String::new()
            };
            let body = json!({
                "page_size": 300,
                "total_records": users.len(),
                "next_page_token": next,
                "users": users
            });

            let mock = Mock::given(method("GET")).and(path("/users"));
            let mock = if i == 0 {
                mock.and(query_param_is_missing("next_page_token"))
            } else {
                mock.and(query_param("next_page_token", format!("page-{i}")))
            };
            mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&self.server)
                .await;
        }
    }

    /// Directory listing failing with `status`.
    pub async fn mount_users_failure(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "code": 124,
                "message": "Invalid access token."
            })))
            .mount(&self.server)
            .await;
    }

    /// One page of recordings for `user_id`.
    pub async fn mount_recordings(&self, user_id: &str, meetings: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path(format!("/users/{user_id}/recordings")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "from": "2024-05-01",
                "to": "2024-05-31",
                "page_size": 50,
                "total_records": meetings.len(),
                "next_page_token": "",
                "meetings": meetings
            })))
            .mount(&self.server)
            .await;
    }

    /// Recordings query for `user_id` failing with `status`.
    pub async fn mount_recordings_failure(&self, user_id: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/users/{user_id}/recordings")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "code": 500,
                "message": "Internal error"
            })))
            .mount(&self.server)
            .await;
    }

    /// Fail the test on drop if any recordings query is made.
    pub async fn expect_no_recordings_calls(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/users/[^/]+/recordings$"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Successful lookup of `user_id`, expected exactly `times` times.
    pub async fn mount_profile(&self, user_id: &str, profile: Value, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/users/{user_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Failed lookup of `user_id`, expected exactly `times` times.
    pub async fn mount_profile_failure(&self, user_id: &str, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/users/{user_id}")))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "code": 1001,
                "message": format!("User does not exist: {user_id}.")
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Number of requests received for exactly `request_path`.
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
