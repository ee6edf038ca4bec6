//! Post-aggregation result filtering.
//!
//! All matching is case-insensitive substring matching. Present filters are
//! ANDed; a filter that is empty or whitespace-only is treated as absent.

use crate::models::MeetingRecording;

/// Criteria applied to enriched recordings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingFilter {
    /// Matched against `owner_email`.
    pub owner_email: Option<String>,
    /// Matched against `topic`.
    pub topic: Option<String>,
    /// Matched against topic, owner and host fields combined.
    pub free_text: Option<String>,
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

impl RecordingFilter {
    /// Build from raw query parameters.
    pub fn from_query(owner: Option<&str>, topic: Option<&str>, free_text: Option<&str>) -> Self {
        Self {
            owner_email: normalize(owner),
            topic: normalize(topic),
            free_text: normalize(free_text),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.owner_email.is_none() && self.topic.is_none() && self.free_text.is_none()
    }

    pub fn matches(&self, meeting: &MeetingRecording) -> bool {
        if let Some(owner) = &self.owner_email {
            if !meeting.owner_email.to_lowercase().contains(owner.as_str()) {
                return false;
            }
        }

        if let Some(topic) = &self.topic {
            if !meeting.topic.to_lowercase().contains(topic.as_str()) {
                return false;
            }
        }

        if let Some(text) = &self.free_text {
            let haystack = [
                meeting.topic.as_str(),
                meeting.owner_email.as_str(),
                meeting.owner_name.as_str(),
                meeting.host_id.as_str(),
                meeting.host_name.as_deref().unwrap_or_default(),
                meeting.host_email.as_deref().unwrap_or_default(),
            ]
            .join(" ")
            .to_lowercase();
            if !haystack.contains(text.as_str()) {
                return false;
            }
        }

        true
    }

    /// Keep matching meetings, preserving order.
    pub fn apply(&self, meetings: Vec<MeetingRecording>) -> Vec<MeetingRecording> {
        if self.is_empty() {
            return meetings;
        }
        meetings.into_iter().filter(|m| self.matches(m)).collect()
    }
}
