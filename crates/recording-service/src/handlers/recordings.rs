//! Tenant-wide recordings handler.
//!
//! `GET /api/v1/recordings` composes the whole pipeline:
//!
//! ```text
//! token -> users -> fan-out -> enrich -> filter -> respond
//! ```
//!
//! Only token and directory failures abort the request (502). Per-user
//! failures are reported inside a 200 response.
//!
//! Two debug modes stop the pipeline early:
//! - `debug=users`: enumerated users only, no recordings fetched
//! - `debug=user-recordings`: per-user meeting counts and errors, no
//!   payloads and no enrichment

use crate::errors::RsError;
use crate::models::{
    DateRange, MeetingRecording, RecordingsResponse, TenantUser, UserMeetingCount,
    UserRecordingsDebugResponse, UsersDebugResponse,
};
use crate::routes::AppState;
use crate::services::enricher::enrich;
use crate::services::user_enumerator::list_active_users;
use crate::services::{aggregate, AggregationOutcome, FanoutOptions, RecordingFilter};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Days, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Days covered when `from` is omitted.
pub const DEFAULT_WINDOW_DAYS: u64 = 30;

/// Query parameters for `GET /api/v1/recordings`.
#[derive(Debug, Default, Deserialize)]
pub struct RecordingsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub debug: Option<String>,
    pub owner: Option<String>,
    pub topic: Option<String>,
    pub q: Option<String>,
}

/// Response mode selected by the `debug` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    Off,
    Users,
    UserRecordings,
}

impl DebugMode {
    /// # Errors
    ///
    /// `RsError::BadRequest` for unrecognized values.
    pub fn parse(value: Option<&str>) -> Result<Self, RsError> {
        match value.map(str::trim) {
            None | Some("") => Ok(DebugMode::Off),
            Some("users") => Ok(DebugMode::Users),
            Some("user-recordings") => Ok(DebugMode::UserRecordings),
            Some(other) => Err(RsError::BadRequest(format!(
                "unknown debug mode '{other}', expected 'users' or 'user-recordings'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DebugMode::Off => "off",
            DebugMode::Users => "users",
            DebugMode::UserRecordings => "user-recordings",
        }
    }
}

/// Per-request pipeline progress, recorded in traces.
///
/// Stages only move forward. Early exits happen before `Aggregating`
/// (token or directory failure) or at a debug mode's stopping point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Idle,
    TokenAcquired,
    UsersEnumerated,
    Aggregating,
    Enriching,
    Filtering,
    Responded,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::TokenAcquired => "token_acquired",
            PipelineStage::UsersEnumerated => "users_enumerated",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Enriching => "enriching",
            PipelineStage::Filtering => "filtering",
            PipelineStage::Responded => "responded",
        }
    }
}

struct Pipeline {
    stage: PipelineStage,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        debug!(
            target: "rs.handlers.recordings",
            from = self.stage.as_str(),
            to = next.as_str(),
            "Pipeline stage"
        );
        self.stage = next;
    }
}

fn parse_date(name: &str, value: Option<&str>) -> Result<Option<NaiveDate>, RsError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                RsError::BadRequest(format!("invalid '{name}' date '{raw}', expected YYYY-MM-DD"))
            }),
    }
}

/// Resolve the requested window, defaulting `to` to `today` and `from` to
/// `to - 30 days`.
///
/// # Errors
///
/// `RsError::BadRequest` for malformed dates or `from > to`.
pub fn resolve_range(query: &RecordingsQuery, today: NaiveDate) -> Result<DateRange, RsError> {
    let to = parse_date("to", query.to.as_deref())?.unwrap_or(today);
    let from = match parse_date("from", query.from.as_deref())? {
        Some(from) => from,
        None => to
            .checked_sub_days(Days::new(DEFAULT_WINDOW_DAYS))
            .unwrap_or(NaiveDate::MIN),
    };

    if from > to {
        return Err(RsError::BadRequest(format!(
            "'from' ({from}) must not be after 'to' ({to})"
        )));
    }

    Ok(DateRange { from, to })
}

fn user_meeting_counts(
    users: &[TenantUser],
    meetings: &[MeetingRecording],
) -> Vec<UserMeetingCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for meeting in meetings {
        *counts.entry(meeting.owner_id.as_str()).or_insert(0) += 1;
    }

    users
        .iter()
        .map(|user| UserMeetingCount {
            user_id: user.id.clone(),
            email: user.email.clone(),
            meeting_count: counts.get(user.id.as_str()).copied().unwrap_or(0),
        })
        .collect()
}

/// Handler for GET /api/v1/recordings
///
/// Query: `from`, `to` (`YYYY-MM-DD`), `debug` (`users` |
/// `user-recordings`), `owner`, `topic`, `q`.
///
/// # Errors
///
/// - 400 for malformed parameters
/// - 502 `AUTH_FAILED` if no platform token can be obtained
/// - 502 `DIRECTORY_FAILED` if the user directory cannot be listed
#[instrument(
    skip_all,
    name = "rs.recordings.list",
    fields(debug = tracing::field::Empty, users = tracing::field::Empty)
)]
pub async fn list_recordings(
    State(state): State<Arc<AppState>>,
    query: Result<Query<RecordingsQuery>, QueryRejection>,
) -> Result<Response, RsError> {
    let Query(query) = query.map_err(|rejection| RsError::BadRequest(rejection.body_text()))?;
    let range = resolve_range(&query, Utc::now().date_naive())?;
    let mode = DebugMode::parse(query.debug.as_deref())?;
    let filter = RecordingFilter::from_query(
        query.owner.as_deref(),
        query.topic.as_deref(),
        query.q.as_deref(),
    );
    tracing::Span::current().record("debug", mode.as_str());

    let mut pipeline = Pipeline::new();

    let token = state.token_provider.token().await?;
    pipeline.advance(PipelineStage::TokenAcquired);

    let users = list_active_users(state.platform.as_ref(), &token).await?;
    tracing::Span::current().record("users", users.len());
    pipeline.advance(PipelineStage::UsersEnumerated);

    if mode == DebugMode::Users {
        pipeline.advance(PipelineStage::Responded);
        return Ok(Json(UsersDebugResponse {
            mode: DebugMode::Users.as_str(),
            total: users.len(),
            users,
        })
        .into_response());
    }

    let users: Arc<[TenantUser]> = users.into();
    pipeline.advance(PipelineStage::Aggregating);
    let AggregationOutcome { meetings, errors } = aggregate(
        Arc::clone(&state.platform),
        &token,
        Arc::clone(&users),
        range,
        FanoutOptions {
            concurrency: state.config.fanout_concurrency,
            deadline: state.config.aggregation_timeout(),
        },
    )
    .await;

    if mode == DebugMode::UserRecordings {
        pipeline.advance(PipelineStage::Responded);
        return Ok(Json(UserRecordingsDebugResponse {
            mode: DebugMode::UserRecordings.as_str(),
            from: range.from,
            to: range.to,
            total_meetings: meetings.len(),
            users: user_meeting_counts(&users, &meetings),
            errors,
        })
        .into_response());
    }

    pipeline.advance(PipelineStage::Enriching);
    let meetings = enrich(&state.host_directory, &token, meetings).await;

    pipeline.advance(PipelineStage::Filtering);
    let meetings = filter.apply(meetings);

    info!(
        target: "rs.handlers.recordings",
        from = %range.from,
        to = %range.to,
        meetings = meetings.len(),
        errors = errors.len(),
        "Recordings aggregated"
    );

    pipeline.advance(PipelineStage::Responded);
    Ok(Json(RecordingsResponse {
        from: range.from,
        to: range.to,
        total: meetings.len(),
        meetings,
        errors,
    })
    .into_response())
}
