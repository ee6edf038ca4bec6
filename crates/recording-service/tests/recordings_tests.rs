//! Recordings endpoint integration tests.
//!
//! Drive `GET /api/v1/recordings` end to end through the real router,
//! token provider and platform client against a wiremock platform.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use recording_test_utils::{
    meeting_json, profile_json, user_json, FakePlatform, TestRecordingServer, FAKE_ACCESS_TOKEN,
};
use serde_json::Value;

const RANGE: &str = "from=2024-05-01&to=2024-05-31";

async fn get_json(url: String) -> Result<(u16, Value), anyhow::Error> {
    let response = reqwest::get(url).await?;
    let status = response.status().as_u16();
    let body: Value = response.json().await?;
    Ok((status, body))
}

fn find<'a>(meetings: &'a Value, uuid: &str) -> &'a Value {
    meetings
        .as_array()
        .expect("meetings should be an array")
        .iter()
        .find(|m| m["uuid"] == uuid)
        .unwrap_or_else(|| panic!("meeting {uuid} missing"))
}

/// Three users, one failing; hosts resolve to a name and to Unknown.
/// Each host is expected to be looked up `lookups` times.
async fn three_user_tenant_with_lookups(lookups: u64) -> FakePlatform {
    let platform = FakePlatform::start().await;
    platform.mount_token().await;
    platform
        .mount_users(vec![
            user_json("u1", "ada@example.com", "Ada", "Lovelace"),
            user_json("u2", "bob@example.com", "Bob", ""),
            user_json("u3", "cy@example.com", "Cy", "Young"),
        ])
        .await;
    platform
        .mount_recordings(
            "u1",
            vec![
                meeting_json("m-a", "Daily Standup", "h1"),
                meeting_json("m-b", "Design Review", "h1"),
            ],
        )
        .await;
    platform.mount_recordings_failure("u2", 500).await;
    platform
        .mount_recordings("u3", vec![meeting_json("m-c", "standup (EU)", "h2")])
        .await;
    platform
        .mount_profile(
            "h1",
            profile_json("Hana", "Host", "hana@example.com"),
            lookups,
        )
        .await;
    platform.mount_profile_failure("h2", 404, lookups).await;
    platform
}

async fn three_user_tenant() -> FakePlatform {
    three_user_tenant_with_lookups(1).await
}

#[tokio::test]
async fn test_aggregates_across_users_with_partial_failure() -> Result<(), anyhow::Error> {
    let platform = three_user_tenant().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;

    assert_eq!(status, 200);
    assert_eq!(body["from"], "2024-05-01");
    assert_eq!(body["to"], "2024-05-31");
    assert_eq!(body["total"], 3);
    assert_eq!(body["meetings"].as_array().unwrap().len(), 3);

    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["userId"], "u2");
    assert_eq!(errors[0]["userEmail"], "bob@example.com");
    assert_eq!(errors[0]["httpStatus"], 500);
    assert_eq!(errors[0]["message"], "Internal error");

    let a = find(&body["meetings"], "m-a");
    assert_eq!(a["ownerId"], "u1");
    assert_eq!(a["ownerEmail"], "ada@example.com");
    assert_eq!(a["ownerName"], "Ada Lovelace");
    assert_eq!(a["hostName"], "Hana Host");
    assert_eq!(a["hostEmail"], "hana@example.com");

    let c = find(&body["meetings"], "m-c");
    assert_eq!(c["ownerId"], "u3");
    assert_eq!(c["hostName"], "Unknown");
    assert_eq!(c["hostEmail"], "");

    Ok(())
}

#[tokio::test]
async fn test_meeting_payload_is_normalized() -> Result<(), anyhow::Error> {
    let platform = three_user_tenant().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    let (_, body) = get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;
    let a = find(&body["meetings"], "m-a");

    assert_eq!(a["durationSeconds"], 1800);
    assert_eq!(a["numericId"], 81_234_567_890_i64);
    assert_eq!(a["files"][0]["sizeBytes"], 1_048_576);
    assert_eq!(a["files"][0]["fileType"], "MP4");

    Ok(())
}

#[tokio::test]
async fn test_upstream_calls_carry_token_and_range() -> Result<(), anyhow::Error> {
    let platform = three_user_tenant().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;
    get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;

    // Token is cached across requests
    assert_eq!(platform.request_count("/oauth/token").await, 1);

    let requests = platform.server().received_requests().await.unwrap();
    let recordings_call = requests
        .iter()
        .find(|r| r.url.path() == "/users/u1/recordings")
        .expect("recordings request for u1");

    let expected_auth = format!("Bearer {FAKE_ACCESS_TOKEN}");
    assert_eq!(
        recordings_call
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok()),
        Some(expected_auth.as_str())
    );
    let query: Vec<(String, String)> = recordings_call
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert!(query.contains(&("from".to_string(), "2024-05-01".to_string())));
    assert!(query.contains(&("to".to_string(), "2024-05-31".to_string())));

    Ok(())
}

#[tokio::test]
async fn test_repeated_unknown_host_is_looked_up_once() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    platform.mount_token().await;
    platform
        .mount_users(vec![user_json("u1", "ada@example.com", "Ada", "")])
        .await;
    let meetings = (0..50)
        .map(|i| meeting_json(&format!("m{i}"), "Weekly", "h1"))
        .collect();
    platform.mount_recordings("u1", meetings).await;
    platform.mount_profile_failure("h1", 404, 1).await;

    let server = TestRecordingServer::spawn(&platform).await?;

    for _ in 0..2 {
        let (status, body) =
            get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;
        assert_eq!(status, 200);
        assert_eq!(body["total"], 50);
        assert!(body["meetings"]
            .as_array()
            .unwrap()
            .iter()
            .all(|m| m["hostName"] == "Unknown" && m["hostEmail"] == ""));
    }

    assert_eq!(platform.request_count("/users/h1").await, 1);

    Ok(())
}

#[tokio::test]
async fn test_filters_through_query_string() -> Result<(), anyhow::Error> {
    let platform = three_user_tenant().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!(
        "{}/api/v1/recordings?{RANGE}&topic=STANDUP",
        server.url()
    ))
    .await?;
    assert_eq!(status, 200);
    assert_eq!(body["total"], 2);

    let (_, body) = get_json(format!(
        "{}/api/v1/recordings?{RANGE}&topic=standup&owner=cy@",
        server.url()
    ))
    .await?;
    assert_eq!(body["total"], 1);
    assert_eq!(body["meetings"][0]["uuid"], "m-c");

    let (_, body) = get_json(format!(
        "{}/api/v1/recordings?{RANGE}&q=hana",
        server.url()
    ))
    .await?;
    assert_eq!(body["total"], 2);

    let (_, body) = get_json(format!(
        "{}/api/v1/recordings?{RANGE}&topic=%20%20",
        server.url()
    ))
    .await?;
    assert_eq!(body["total"], 3);

    Ok(())
}

#[tokio::test]
async fn test_debug_users_skips_recordings() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    platform.mount_token().await;
    platform
        .mount_users_pages(vec![
            vec![
                user_json("u1", "a@example.com", "A", ""),
                user_json("u2", "b@example.com", "B", ""),
            ],
            vec![user_json("u3", "c@example.com", "C", "")],
        ])
        .await;
    platform.expect_no_recordings_calls().await;

    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!(
        "{}/api/v1/recordings?debug=users",
        server.url()
    ))
    .await?;

    assert_eq!(status, 200);
    assert_eq!(body["mode"], "users");
    assert_eq!(body["total"], 3);
    let ids: Vec<&str> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["u1", "u2", "u3"]);
    assert_eq!(body["users"][0]["type"], "1");

    Ok(())
}

#[tokio::test]
async fn test_debug_user_recordings_reports_counts() -> Result<(), anyhow::Error> {
    // No enrichment in this mode, so no host lookups
    let platform = three_user_tenant_with_lookups(0).await;
    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!(
        "{}/api/v1/recordings?{RANGE}&debug=user-recordings",
        server.url()
    ))
    .await?;

    assert_eq!(status, 200);
    assert_eq!(body["mode"], "user-recordings");
    assert_eq!(body["totalMeetings"], 3);
    assert_eq!(body["users"][0]["userId"], "u1");
    assert_eq!(body["users"][0]["meetingCount"], 2);
    assert_eq!(body["users"][1]["meetingCount"], 0);
    assert_eq!(body["users"][2]["meetingCount"], 1);
    assert_eq!(body["errors"][0]["userId"], "u2");
    assert!(body.get("meetings").is_none());

    Ok(())
}

#[tokio::test]
async fn test_token_failure_returns_502() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    platform.mount_token_failure(401).await;

    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;

    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "AUTH_FAILED");
    assert_eq!(platform.request_count("/users").await, 0);

    Ok(())
}

#[tokio::test]
async fn test_directory_failure_returns_502() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    platform.mount_token().await;
    platform.mount_users_failure(401).await;
    platform.expect_no_recordings_calls().await;

    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!("{}/api/v1/recordings?{RANGE}", server.url())).await?;

    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "DIRECTORY_FAILED");
    assert_eq!(body["error"]["upstreamStatus"], 401);

    Ok(())
}

#[tokio::test]
async fn test_invalid_parameters_return_400() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    let server = TestRecordingServer::spawn(&platform).await?;

    for query in [
        "from=2024-13-01",
        "from=2024-06-01&to=2024-05-01",
        "debug=everything",
        "from=2024-05-01&from=2024-05-02",
    ] {
        let (status, body) =
            get_json(format!("{}/api/v1/recordings?{query}", server.url())).await?;
        assert_eq!(status, 400, "query {query}");
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    assert_eq!(platform.request_count("/oauth/token").await, 0);

    Ok(())
}

#[tokio::test]
async fn test_empty_tenant_returns_empty_listing() -> Result<(), anyhow::Error> {
    let platform = FakePlatform::start().await;
    platform.mount_token().await;
    platform.mount_users(vec![]).await;

    let server = TestRecordingServer::spawn(&platform).await?;

    let (status, body) = get_json(format!("{}/api/v1/recordings", server.url())).await?;

    assert_eq!(status, 200);
    assert_eq!(body["total"], 0);
    assert!(body.get("errors").is_none());

    Ok(())
}
