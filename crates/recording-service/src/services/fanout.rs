//! Bounded fan-out over tenant users.
//!
//! A fixed pool of `min(concurrency, users)` worker tasks pulls users from a
//! shared cursor. Each worker fetches every recordings page of the user it
//! claimed, then claims the next one, until the cursor runs past the end.
//!
//! Failure of one user never affects another: it becomes one
//! [`AggregationError`] and the worker moves on. A panic inside a user's
//! fetch is caught and reported the same way. The call returns once every
//! worker has finished. Meeting order across users is unspecified.
//!
//! # Shared state
//!
//! - cursor: `AtomicUsize`, claimed with `fetch_add`
//! - meetings / errors: `Mutex<Vec<_>>`, appended under the lock; a
//!   poisoned lock is recovered rather than propagated

use crate::models::{AggregationError, DateRange, MeetingRecording, RecordedMeeting, TenantUser};
use crate::observability::metrics;
use crate::services::platform_client::PlatformApi;
use common::error::UpstreamError;
use common::secret::SecretString;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// Safety cap on recordings pages per user (50 recordings each).
pub const MAX_USER_RECORDING_PAGES: usize = 100;

/// Message recorded for users not finished before the deadline.
pub const DEADLINE_EXCEEDED_MESSAGE: &str = "aggregation deadline exceeded";

/// Message recorded for users whose fetch panicked.
pub const FETCH_PANICKED_MESSAGE: &str = "recordings fetch panicked";

/// Message recorded for users left unclaimed after every worker stopped.
pub const NOT_PROCESSED_MESSAGE: &str = "user not processed";

/// Fan-out tuning.
#[derive(Debug, Clone, Copy)]
pub struct FanoutOptions {
    /// Maximum simultaneous per-user fetches. Zero is treated as one.
    pub concurrency: usize,
    /// Wall-clock budget for the whole aggregation.
    pub deadline: Duration,
}

/// Merged per-user results.
#[derive(Debug, Default)]
pub struct AggregationOutcome {
    pub meetings: Vec<MeetingRecording>,
    pub errors: Vec<AggregationError>,
}

struct SharedOutcome {
    cursor: AtomicUsize,
    meetings: Mutex<Vec<MeetingRecording>>,
    errors: Mutex<Vec<AggregationError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedOutcome {
    fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            meetings: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    fn claim_next(&self) -> usize {
        self.cursor.fetch_add(1, Ordering::SeqCst)
    }

    fn push_meetings(&self, owner: &TenantUser, meetings: Vec<RecordedMeeting>) {
        let tagged = meetings
            .into_iter()
            .map(|m| MeetingRecording::owned_by(m, owner));
        lock(&self.meetings).extend(tagged);
    }

    fn push_error(&self, error: AggregationError) {
        lock(&self.errors).push(error);
    }

    /// Users never claimed by any worker.
    fn unclaimed<'a>(&self, users: &'a [TenantUser]) -> &'a [TenantUser] {
        let claimed = self.cursor.load(Ordering::SeqCst).min(users.len());
        users.get(claimed..).unwrap_or_default()
    }

    fn take(&self) -> AggregationOutcome {
        AggregationOutcome {
            meetings: std::mem::take(&mut *lock(&self.meetings)),
            errors: std::mem::take(&mut *lock(&self.errors)),
        }
    }
}

fn upstream_failure(user: &TenantUser, error: &UpstreamError) -> AggregationError {
    AggregationError {
        user_id: user.id.clone(),
        user_email: user.email.clone(),
        http_status: error.http_status(),
        message: error.message(),
    }
}

fn local_failure(user: &TenantUser, message: &str) -> AggregationError {
    AggregationError {
        user_id: user.id.clone(),
        user_email: user.email.clone(),
        http_status: None,
        message: message.to_string(),
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload")
}

/// Fetch every recordings page for one user.
///
/// All-or-nothing: a failure on any page discards the pages already read.
async fn fetch_user_recordings(
    api: &dyn PlatformApi,
    token: &SecretString,
    user: &TenantUser,
    range: &DateRange,
) -> Result<Vec<RecordedMeeting>, UpstreamError> {
    let mut meetings = Vec::new();
    let mut page_token: Option<String> = None;

    for _ in 0..MAX_USER_RECORDING_PAGES {
        let page = api
            .list_user_recordings_page(token, &user.id, range, page_token.as_deref())
            .await?;
        meetings.extend(page.meetings);

        match page.next_page_token {
            Some(next) => page_token = Some(next),
            None => return Ok(meetings),
        }
    }

    warn!(
        target: "rs.services.fanout",
        user_id = %user.id,
        pages = MAX_USER_RECORDING_PAGES,
        "Recordings page cap reached, remaining pages skipped"
    );
    Ok(meetings)
}

async fn run_worker(
    worker_id: usize,
    api: Arc<dyn PlatformApi>,
    token: SecretString,
    users: Arc<[TenantUser]>,
    range: DateRange,
    shared: Arc<SharedOutcome>,
    deadline: tokio::time::Instant,
) {
    let mut processed = 0usize;

    loop {
        let index = shared.claim_next();
        let Some(user) = users.get(index) else {
            break;
        };

        let fetch =
            AssertUnwindSafe(fetch_user_recordings(api.as_ref(), &token, user, &range))
                .catch_unwind();
        match tokio::time::timeout_at(deadline, fetch).await {
            Ok(Ok(Ok(meetings))) => {
                debug!(
                    target: "rs.services.fanout",
                    worker_id,
                    user_id = %user.id,
                    meetings = meetings.len(),
                    "User recordings fetched"
                );
                shared.push_meetings(user, meetings);
            }
            Ok(Ok(Err(e))) => {
                warn!(
                    target: "rs.services.fanout",
                    worker_id,
                    user_id = %user.id,
                    error = %e,
                    "User recordings fetch failed"
                );
                shared.push_error(upstream_failure(user, &e));
            }
            Ok(Err(panic)) => {
                error!(
                    target: "rs.services.fanout",
                    worker_id,
                    user_id = %user.id,
                    panic = %panic_detail(panic.as_ref()),
                    "User recordings fetch panicked"
                );
                shared.push_error(local_failure(user, FETCH_PANICKED_MESSAGE));
            }
            Err(_) => {
                warn!(
                    target: "rs.services.fanout",
                    worker_id,
                    user_id = %user.id,
                    "User recordings fetch hit aggregation deadline"
                );
                shared.push_error(local_failure(user, DEADLINE_EXCEEDED_MESSAGE));
            }
        }
        processed += 1;
    }

    debug!(target: "rs.services.fanout", worker_id, processed, "Worker finished");
}

/// Fetch recordings for every user with at most `options.concurrency`
/// fetches in flight.
///
/// Never fails as a whole: per-user failures are returned in
/// `AggregationOutcome::errors`.
#[instrument(skip_all, name = "rs.services.aggregate", fields(users = users.len()))]
pub async fn aggregate(
    api: Arc<dyn PlatformApi>,
    token: &SecretString,
    users: Arc<[TenantUser]>,
    range: DateRange,
    options: FanoutOptions,
) -> AggregationOutcome {
    let started = Instant::now();
    let worker_count = options.concurrency.max(1).min(users.len());
    let deadline = tokio::time::Instant::now() + options.deadline;
    let shared = Arc::new(SharedOutcome::new());

    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count {
        workers.spawn(run_worker(
            worker_id,
            Arc::clone(&api),
            token.clone(),
            Arc::clone(&users),
            range,
            Arc::clone(&shared),
            deadline,
        ));
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(target: "rs.services.fanout", error = %e, "Fan-out worker terminated abnormally");
        }
    }

    for user in shared.unclaimed(&users) {
        shared.push_error(local_failure(user, NOT_PROCESSED_MESSAGE));
    }

    let outcome = shared.take();

    info!(
        target: "rs.services.fanout",
        users = users.len(),
        workers = worker_count,
        meetings = outcome.meetings.len(),
        errors = outcome.errors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Aggregation complete"
    );
    metrics::record_aggregation(users.len(), outcome.errors.len(), started.elapsed());

    outcome
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::models::{RecordingsPage, UserProfile, UsersPage};
    use crate::services::platform_client::mock::MockPlatform;
    use chrono::NaiveDate;
    use std::collections::{HashMap, HashSet};

    fn user(id: &str) -> TenantUser {
        TenantUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            first_name: id.to_uppercase(),
            last_name: String::new(),
            status: "active".to_string(),
            user_type: "1".to_string(),
        }
    }

    fn meeting(uuid: &str, host_id: &str) -> RecordedMeeting {
        RecordedMeeting {
            uuid: uuid.to_string(),
            numeric_id: 1,
            topic: format!("Topic {uuid}"),
            host_id: host_id.to_string(),
            start_time: "2024-05-02T10:00:00Z".to_string(),
            duration_seconds: 600,
            auto_delete: false,
            auto_delete_date: String::new(),
            files: vec![],
        }
    }

    fn range() -> DateRange {
        DateRange {
            from: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            to: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        }
    }

    fn options(concurrency: usize) -> FanoutOptions {
        FanoutOptions {
            concurrency,
            deadline: Duration::from_secs(30),
        }
    }

    async fn run(mock: Arc<MockPlatform>, concurrency: usize) -> AggregationOutcome {
        let users: Arc<[TenantUser]> = mock.users().into();
        aggregate(
            mock,
            &SecretString::from("t"),
            users,
            range(),
            options(concurrency),
        )
        .await
    }

    #[tokio::test]
    async fn test_all_success_is_union_tagged_by_owner() {
        let mock = Arc::new(
            MockPlatform::new()
                .with_user(user("u1"), vec![meeting("a", "h1"), meeting("b", "h1")])
                .with_user(user("u2"), vec![])
                .with_user(user("u3"), vec![meeting("c", "h2")]),
        );

        let outcome = run(mock, 5).await;

        assert!(outcome.errors.is_empty());
        let owners: HashMap<String, String> = outcome
            .meetings
            .iter()
            .map(|m| (m.uuid.clone(), m.owner_id.clone()))
            .collect();
        assert_eq!(
            owners,
            HashMap::from([
                ("a".to_string(), "u1".to_string()),
                ("b".to_string(), "u1".to_string()),
                ("c".to_string(), "u3".to_string()),
            ])
        );
        let c = outcome.meetings.iter().find(|m| m.uuid == "c").unwrap();
        assert_eq!(c.owner_email, "u3@example.com");
        assert_eq!(c.owner_name, "U3");
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let mock = Arc::new(
            MockPlatform::new()
                .with_user(user("u1"), vec![meeting("a", "h1"), meeting("b", "h1")])
                .with_failing_user(
                    user("u2"),
                    UpstreamError::Status {
                        status: 500,
                        message: "Internal Server Error".to_string(),
                    },
                )
                .with_user(user("u3"), vec![meeting("c", "h1")]),
        );

        let outcome = run(mock, 2).await;

        assert_eq!(outcome.meetings.len(), 3);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].user_id, "u2");
        assert_eq!(outcome.errors[0].user_email, "u2@example.com");
        assert_eq!(outcome.errors[0].http_status, Some(500));
    }

    #[tokio::test]
    async fn test_malformed_response_is_per_user_error() {
        let mock = Arc::new(
            MockPlatform::new()
                .with_failing_user(
                    user("u1"),
                    UpstreamError::Malformed("expected value at line 1".to_string()),
                )
                .with_user(user("u2"), vec![meeting("x", "h1")]),
        );

        let outcome = run(mock, 5).await;

        assert_eq!(outcome.meetings.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].http_status, None);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut mock = MockPlatform::new().with_delay(Duration::from_millis(20));
        for i in 0..20 {
            mock = mock.with_user(user(&format!("u{i}")), vec![meeting(&format!("m{i}"), "h")]);
        }
        let mock = Arc::new(mock);

        let outcome = run(Arc::clone(&mock), 3).await;

        assert_eq!(outcome.meetings.len(), 20);
        assert_eq!(mock.recordings_calls(), 20);
        assert!(mock.max_in_flight() <= 3, "saw {}", mock.max_in_flight());
        assert!(mock.max_in_flight() >= 2, "workers never overlapped");
    }

    #[tokio::test]
    async fn test_fewer_users_than_workers() {
        let mock = Arc::new(
            MockPlatform::new()
                .with_delay(Duration::from_millis(10))
                .with_user(user("only"), vec![meeting("m", "h")]),
        );

        let outcome = run(Arc::clone(&mock), 5).await;

        assert_eq!(outcome.meetings.len(), 1);
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let mock = Arc::new(MockPlatform::new().with_user(user("u1"), vec![meeting("m", "h")]));

        let outcome = run(mock, 0).await;
        assert_eq!(outcome.meetings.len(), 1);
    }

    #[tokio::test]
    async fn test_no_users_no_calls() {
        let mock = Arc::new(MockPlatform::new());

        let outcome = run(Arc::clone(&mock), 5).await;

        assert!(outcome.meetings.is_empty());
        assert!(outcome.errors.is_empty());
        assert_eq!(mock.recordings_calls(), 0);
    }

    #[tokio::test]
    async fn test_user_recordings_are_paginated() {
        let meetings: Vec<RecordedMeeting> =
            (0..7).map(|i| meeting(&format!("m{i}"), "h")).collect();
        let mock = Arc::new(
            MockPlatform::new()
                .with_recordings_page_size(3)
                .with_user(user("u1"), meetings),
        );

        let outcome = run(Arc::clone(&mock), 1).await;

        let uuids: Vec<&str> = outcome.meetings.iter().map(|m| m.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["m0", "m1", "m2", "m3", "m4", "m5", "m6"]);
        assert_eq!(mock.recordings_calls(), 3);
    }

    #[tokio::test]
    async fn test_deadline_becomes_per_user_error() {
        let mock = Arc::new(
            MockPlatform::new()
                .with_delay(Duration::from_millis(500))
                .with_user(user("slow1"), vec![meeting("a", "h")])
                .with_user(user("slow2"), vec![meeting("b", "h")]),
        );
        let users: Arc<[TenantUser]> = mock.users().into();

        let outcome = aggregate(
            mock,
            &SecretString::from("t"),
            users,
            range(),
            FanoutOptions {
                concurrency: 2,
                deadline: Duration::from_millis(50),
            },
        )
        .await;

        assert!(outcome.meetings.is_empty());
        assert_eq!(outcome.errors.len(), 2);
        let failed: HashSet<&str> = outcome.errors.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(failed, HashSet::from(["slow1", "slow2"]));
        assert!(outcome
            .errors
            .iter()
            .all(|e| e.message == DEADLINE_EXCEEDED_MESSAGE));
    }

    /// Delegates to a [`MockPlatform`] but panics on one user's recordings.
    struct PanickingPlatform {
        inner: MockPlatform,
        panic_for: &'static str,
    }

    #[async_trait::async_trait]
    impl PlatformApi for PanickingPlatform {
        async fn list_users_page(
            &self,
            token: &SecretString,
            page_token: Option<&str>,
        ) -> Result<UsersPage, UpstreamError> {
            self.inner.list_users_page(token, page_token).await
        }

        async fn list_user_recordings_page(
            &self,
            token: &SecretString,
            user_id: &str,
            range: &DateRange,
            page_token: Option<&str>,
        ) -> Result<RecordingsPage, UpstreamError> {
            if user_id == self.panic_for {
                panic!("recordings decoder blew up for {user_id}");
            }
            self.inner
                .list_user_recordings_page(token, user_id, range, page_token)
                .await
        }

        async fn get_user(
            &self,
            token: &SecretString,
            user_id: &str,
        ) -> Result<UserProfile, UpstreamError> {
            self.inner.get_user(token, user_id).await
        }
    }

    #[tokio::test]
    async fn test_panicking_user_becomes_error_and_others_continue() {
        let inner = MockPlatform::new()
            .with_user(user("u1"), vec![meeting("a", "h1")])
            .with_user(user("u2"), vec![meeting("b", "h1")])
            .with_user(user("u3"), vec![meeting("c", "h1")]);
        let users: Arc<[TenantUser]> = inner.users().into();
        let api = Arc::new(PanickingPlatform {
            inner,
            panic_for: "u2",
        });

        let outcome = aggregate(api, &SecretString::from("t"), users, range(), options(1)).await;

        let uuids: HashSet<&str> = outcome.meetings.iter().map(|m| m.uuid.as_str()).collect();
        assert_eq!(uuids, HashSet::from(["a", "c"]));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].user_id, "u2");
        assert_eq!(outcome.errors[0].http_status, None);
        assert_eq!(outcome.errors[0].message, FETCH_PANICKED_MESSAGE);
    }

    #[test]
    fn test_unclaimed_users_after_cursor() {
        let users = vec![user("u1"), user("u2"), user("u3")];
        let shared = SharedOutcome::new();

        assert_eq!(shared.unclaimed(&users).len(), 3);

        shared.claim_next();
        let rest: Vec<&str> = shared
            .unclaimed(&users)
            .iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(rest, vec!["u2", "u3"]);

        for _ in 0..5 {
            shared.claim_next();
        }
        assert!(shared.unclaimed(&users).is_empty());
    }
}
