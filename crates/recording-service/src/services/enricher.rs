//! Host enrichment for aggregated recordings.

use crate::models::{HostIdentity, MeetingRecording};
use crate::services::host_directory::HostDirectoryCache;
use common::secret::SecretString;
use tracing::{debug, instrument};

/// Attach `host_name` / `host_email` to every meeting.
///
/// Each distinct host id is resolved at most once (through the cache), then
/// meetings are mapped against the warmed entries. Output order matches
/// input order.
#[instrument(skip_all, name = "rs.services.enrich", fields(meetings = meetings.len()))]
pub async fn enrich(
    cache: &HostDirectoryCache,
    token: &SecretString,
    meetings: Vec<MeetingRecording>,
) -> Vec<MeetingRecording> {
    if meetings.is_empty() {
        return meetings;
    }

    cache
        .prewarm(token, meetings.iter().map(|m| m.host_id.as_str()))
        .await;

    let hosts = cache
        .lookup_many(meetings.iter().map(|m| m.host_id.as_str()))
        .await;

    debug!(
        target: "rs.services.enricher",
        meetings = meetings.len(),
        hosts = hosts.len(),
        "Enriching meetings with host identities"
    );

    let unknown = HostIdentity::unknown();
    meetings
        .into_iter()
        .map(|meeting| {
            let host = hosts.get(&meeting.host_id).unwrap_or(&unknown).clone();
            meeting.with_host(&host)
        })
        .collect()
}
