//! Upstream payload shapes and their normalization.
//!
//! Every field is optional on the wire. `normalize` is the only place that
//! decides what a missing or oddly-typed field becomes; nothing downstream
//! re-derives fallbacks.

use super::{
    RecordedMeeting, RecordingFile, RecordingsPage, TenantUser, UserProfile, UsersPage,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireUsersPage {
    pub users: Vec<WireUser>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireUser {
    pub id: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub user_type: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireRecordingsPage {
    pub meetings: Vec<WireMeeting>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireMeeting {
    pub uuid: Option<String>,
    pub id: Option<Value>,
    pub topic: Option<String>,
    pub host_id: Option<String>,
    pub start_time: Option<String>,
    /// Minutes.
    pub duration: Option<u64>,
    pub auto_delete: Option<bool>,
    pub auto_delete_date: Option<String>,
    pub recording_files: Vec<WireRecordingFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireRecordingFile {
    pub id: Option<String>,
    pub file_type: Option<String>,
    pub file_extension: Option<String>,
    pub file_size: Option<u64>,
    pub recording_start: Option<String>,
    pub recording_end: Option<String>,
    pub download_url: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WireUserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Empty continuation tokens mean "no more pages".
fn continuation(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

fn render_scalar(value: Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn numeric_id(value: Option<Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

impl WireUsersPage {
    /// Users without an id cannot be queried and are dropped.
    pub fn normalize(self) -> UsersPage {
        let total = self.users.len();
        let users: Vec<TenantUser> = self
            .users
            .into_iter()
            .filter_map(WireUser::normalize)
            .collect();

        if users.len() != total {
            debug!(
                target: "rs.models.wire",
                dropped = total - users.len(),
                "Dropped directory entries without an id"
            );
        }

        UsersPage {
            users,
            next_page_token: continuation(self.next_page_token),
        }
    }
}

impl WireUser {
    pub fn normalize(self) -> Option<TenantUser> {
        let id = self.id.filter(|id| !id.is_empty())?;
        Some(TenantUser {
            id,
            email: self.email.unwrap_or_default(),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            user_type: render_scalar(self.user_type),
        })
    }
}

impl WireRecordingsPage {
    pub fn normalize(self) -> RecordingsPage {
        RecordingsPage {
            meetings: self
                .meetings
                .into_iter()
                .map(WireMeeting::normalize)
                .collect(),
            next_page_token: continuation(self.next_page_token),
        }
    }
}

impl WireMeeting {
    pub fn normalize(self) -> RecordedMeeting {
        RecordedMeeting {
            uuid: self.uuid.unwrap_or_default(),
            numeric_id: numeric_id(self.id),
            topic: self.topic.unwrap_or_default(),
            host_id: self.host_id.unwrap_or_default(),
            start_time: self.start_time.unwrap_or_default(),
            duration_seconds: self.duration.unwrap_or(0).saturating_mul(60),
            auto_delete: self.auto_delete.unwrap_or(false),
            auto_delete_date: self.auto_delete_date.unwrap_or_default(),
            files: self
                .recording_files
                .into_iter()
                .map(WireRecordingFile::normalize)
                .collect(),
        }
    }
}

impl WireRecordingFile {
    pub fn normalize(self) -> RecordingFile {
        RecordingFile {
            id: self.id.unwrap_or_default(),
            file_type: self.file_type.unwrap_or_default(),
            file_extension: self.file_extension.unwrap_or_default(),
            size_bytes: self.file_size.unwrap_or(0),
            recording_start: self.recording_start.unwrap_or_default(),
            recording_end: self.recording_end.unwrap_or_default(),
            download_url: self.download_url.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
        }
    }
}

impl WireUserProfile {
    pub fn normalize(self) -> UserProfile {
        UserProfile {
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
        }
    }
}
