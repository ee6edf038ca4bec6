//! Data models for the recording service.
//!
//! Internal types are strict: every field has a concrete value. Upstream
//! payloads are converted into these types once, in [`wire`].

pub mod wire;

use chrono::NaiveDate;
use serde::Serialize;

/// Display name used when a host cannot be resolved.
pub const UNKNOWN_HOST_NAME: &str = "Unknown";

/// Inclusive date range for a recordings query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Upstream query format (`YYYY-MM-DD`).
    pub fn from_param(&self) -> String {
        self.from.format("%Y-%m-%d").to_string()
    }

    pub fn to_param(&self) -> String {
        self.to.format("%Y-%m-%d").to_string()
    }
}

/// Active member of the tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: String,
    #[serde(rename = "type")]
    pub user_type: String,
}

impl TenantUser {
    /// `"first last"`, trimmed; empty when both parts are empty.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Single file belonging to a recorded meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingFile {
    pub id: String,
    pub file_type: String,
    pub file_extension: String,
    pub size_bytes: u64,
    pub recording_start: String,
    pub recording_end: String,
    pub download_url: String,
    pub status: String,
}

/// Meeting as returned by a per-user recordings query, before it is
/// attributed to the user that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedMeeting {
    pub uuid: String,
    pub numeric_id: i64,
    pub topic: String,
    pub host_id: String,
    pub start_time: String,
    pub duration_seconds: u64,
    pub auto_delete: bool,
    pub auto_delete_date: String,
    pub files: Vec<RecordingFile>,
}

/// Meeting recording in the tenant-wide result.
///
/// `owner_*` always describe the user whose recordings query produced the
/// record. `host_*` are filled in by enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRecording {
    pub uuid: String,
    pub numeric_id: i64,
    pub topic: String,
    pub host_id: String,
    pub start_time: String,
    pub duration_seconds: u64,
    pub auto_delete: bool,
    pub auto_delete_date: String,
    pub files: Vec<RecordingFile>,
    pub owner_id: String,
    pub owner_email: String,
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_email: Option<String>,
}

impl MeetingRecording {
    /// Attribute a meeting to the user whose query returned it.
    pub fn owned_by(meeting: RecordedMeeting, owner: &TenantUser) -> Self {
        Self {
            uuid: meeting.uuid,
            numeric_id: meeting.numeric_id,
            topic: meeting.topic,
            host_id: meeting.host_id,
            start_time: meeting.start_time,
            duration_seconds: meeting.duration_seconds,
            auto_delete: meeting.auto_delete,
            auto_delete_date: meeting.auto_delete_date,
            files: meeting.files,
            owner_id: owner.id.clone(),
            owner_email: owner.email.clone(),
            owner_name: owner.display_name(),
            host_name: None,
            host_email: None,
        }
    }

    /// Copy carrying the given host identity.
    pub fn with_host(self, host: &HostIdentity) -> Self {
        Self {
            host_name: Some(host.name.clone()),
            host_email: Some(host.email.clone()),
            ..self
        }
    }
}

/// Profile returned by a single-user directory lookup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Resolved identity of a meeting host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostIdentity {
    pub name: String,
    pub email: String,
}

impl HostIdentity {
    /// Placeholder for hosts whose lookup failed.
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_HOST_NAME.to_string(),
            email: String::new(),
        }
    }
}

impl From<UserProfile> for HostIdentity {
    /// Name falls back to the email, then to `"Unknown"`.
    fn from(profile: UserProfile) -> Self {
        let full_name = format!("{} {}", profile.first_name, profile.last_name)
            .trim()
            .to_string();
        let name = if !full_name.is_empty() {
            full_name
        } else if !profile.email.is_empty() {
            profile.email.clone()
        } else {
            UNKNOWN_HOST_NAME.to_string()
        };

        Self {
            name,
            email: profile.email,
        }
    }
}

/// Per-user failure recorded during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationError {
    pub user_id: String,
    pub user_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub message: String,
}

/// One page of the tenant user directory.
#[derive(Debug, Clone, Default)]
pub struct UsersPage {
    pub users: Vec<TenantUser>,
    pub next_page_token: Option<String>,
}

/// One page of a user's recordings.
#[derive(Debug, Clone, Default)]
pub struct RecordingsPage {
    pub meetings: Vec<RecordedMeeting>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Tenant-wide recordings response.
#[derive(Debug, Serialize)]
pub struct RecordingsResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total: usize,
    pub meetings: Vec<MeetingRecording>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<AggregationError>,
}

/// `debug=users` response.
#[derive(Debug, Serialize)]
pub struct UsersDebugResponse {
    pub mode: &'static str,
    pub total: usize,
    pub users: Vec<TenantUser>,
}

/// Meeting count for one user in `debug=user-recordings`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMeetingCount {
    pub user_id: String,
    pub email: String,
    pub meeting_count: usize,
}

/// `debug=user-recordings` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecordingsDebugResponse {
    pub mode: &'static str,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_meetings: usize,
    pub users: Vec<UserMeetingCount>,
    pub errors: Vec<AggregationError>,
}
