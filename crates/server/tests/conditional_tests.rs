//! Integration tests for conditional reads and writes on profiles.

mod common;

use axum::http::header::{ETAG, LAST_MODIFIED};
use common::{TEST_ADMIN_TOKEN, TestServer, create_test_cdn, create_test_profile, create_test_token};
use keel_core::Role;
use keel_metadata::models::ProfileRow;
use serde_json::{Value, json};
use std::time::{Duration, SystemTime};

const LONG_AGO: &str = "Mon, 01 Jan 2001 00:00:00 GMT";

fn http_date(t: SystemTime) -> String {
    httpdate::fmt_http_date(t)
}

fn in_a_day() -> String {
    http_date(SystemTime::now() + Duration::from_secs(86_400))
}

async fn setup() -> (TestServer, ProfileRow) {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let cdn = create_test_cdn(metadata.as_ref(), "cdn1").await;
    let profile = create_test_profile(metadata.as_ref(), "EDGE1", cdn.id).await;
    (server, profile)
}

fn update_body(profile: &ProfileRow, description: &str) -> Value {
    json!({
        "name": profile.name,
        "description": description,
        "type": profile.profile_type,
        "cdn": profile.cdn,
    })
}

/// Fetch a profile by ID and return its validators.
async fn validators(server: &TestServer, id: i64) -> (String, String) {
    let (status, headers, _) = server
        .request_with_headers(
            "GET",
            &format!("/api/v4/profiles?id={id}"),
            None,
            Some(TEST_ADMIN_TOKEN),
            &[],
        )
        .await;
    assert_eq!(status, 200);
    let etag = headers.get(ETAG).unwrap().to_str().unwrap().to_string();
    let last_modified = headers.get(LAST_MODIFIED).unwrap().to_str().unwrap().to_string();
    (etag, last_modified)
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_if_modified_since_future_is_not_modified() {
    let (server, profile) = setup().await;

    let (status, _, body) = server
        .request_with_headers(
            "GET",
            &format!("/api/v4/profiles?id={}", profile.id),
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Modified-Since", &in_a_day())],
        )
        .await;
    assert_eq!(status, 304);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_if_modified_since_last_modified_is_not_modified() {
    let (server, profile) = setup().await;
    let (_, last_modified) = validators(&server, profile.id).await;

    let (status, _, _) = server
        .request_with_headers(
            "GET",
            "/api/v4/profiles",
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Modified-Since", &last_modified)],
        )
        .await;
    assert_eq!(status, 304);
}

#[tokio::test]
async fn test_if_modified_since_past_returns_content() {
    let (server, profile) = setup().await;

    let (status, _, body) = server
        .request_with_headers(
            "GET",
            &format!("/api/v4/profiles?id={}", profile.id),
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Modified-Since", LONG_AGO)],
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["response"][0]["name"], "EDGE1");
}

#[tokio::test]
async fn test_if_modified_since_on_empty_result_returns_content() {
    let (server, _) = setup().await;

    let (status, _, body) = server
        .request_with_headers(
            "GET",
            "/api/v4/profiles?name=missing",
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Modified-Since", &in_a_day())],
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["response"], json!([]));
}

#[tokio::test]
async fn test_unparseable_if_modified_since_is_ignored() {
    let (server, profile) = setup().await;

    let (status, _, _) = server
        .request_with_headers(
            "GET",
            &format!("/api/v4/profiles?id={}", profile.id),
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Modified-Since", "not a date")],
        )
        .await;
    assert_eq!(status, 200);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_if_unmodified_since_past_fails_update_and_delete() {
    let (server, profile) = setup().await;

    let (status, _, body) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "changed")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Unmodified-Since", LONG_AGO)],
        )
        .await;
    assert_eq!(status, 412);
    assert_eq!(body["code"], "precondition_failed");

    let (status, _, _) = server
        .request_with_headers(
            "DELETE",
            &format!("/api/v4/profiles/{}", profile.id),
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Unmodified-Since", LONG_AGO)],
        )
        .await;
    assert_eq!(status, 412);

    // Nothing changed.
    let stored = server.metadata().get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(stored.description, profile.description);
    assert_eq!(stored.last_updated, profile.last_updated);
}

#[tokio::test]
async fn test_if_unmodified_since_last_modified_succeeds() {
    let (server, profile) = setup().await;
    let (_, last_modified) = validators(&server, profile.id).await;

    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "changed")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Unmodified-Since", &last_modified)],
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_if_match_stale_tag_fails() {
    let (server, profile) = setup().await;
    let (etag, _) = validators(&server, profile.id).await;

    // First update with the current tag succeeds and changes the tag.
    let (status, headers, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "first")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Match", &etag)],
        )
        .await;
    assert_eq!(status, 200);
    let new_etag = headers.get(ETAG).unwrap().to_str().unwrap().to_string();
    assert_ne!(new_etag, etag);

    // Second update with the old tag is rejected.
    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "second")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Match", &etag)],
        )
        .await;
    assert_eq!(status, 412);

    let stored = server.metadata().get_profile(profile.id).await.unwrap().unwrap();
    assert_eq!(stored.description, "first");

    // Delete with the new tag goes through.
    let (status, _, _) = server
        .request_with_headers(
            "DELETE",
            &format!("/api/v4/profiles/{}", profile.id),
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Match", &new_etag)],
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_if_match_wildcard_succeeds() {
    let (server, profile) = setup().await;

    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "changed")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Match", "*")],
        )
        .await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_unparseable_write_headers_are_ignored() {
    let (server, profile) = setup().await;

    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "changed")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Unmodified-Since", "soon")],
        )
        .await;
    assert_eq!(status, 200);
}

// =============================================================================
// Precedence
// =============================================================================

#[tokio::test]
async fn test_validation_and_not_found_precede_preconditions() {
    let (server, profile) = setup().await;

    let mut invalid = update_body(&profile, "changed");
    invalid["name"] = json!("has space");
    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(invalid),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Match", "\"v1-stale\"")],
        )
        .await;
    assert_eq!(status, 400);

    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            "/api/v4/profiles/9999",
            Some(update_body(&profile, "changed")),
            Some(TEST_ADMIN_TOKEN),
            &[("If-Match", "\"v1-stale\"")],
        )
        .await;
    assert_eq!(status, 404);

    let (status, _, _) = server
        .request_with_headers(
            "DELETE",
            "/api/v4/profiles/9999",
            None,
            Some(TEST_ADMIN_TOKEN),
            &[("If-Unmodified-Since", LONG_AGO)],
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_precondition_precedes_lock() {
    let (server, profile) = setup().await;
    let metadata = server.metadata();
    let alice = create_test_token(metadata.as_ref(), "alice", Role::Operations).await;
    let bob = create_test_token(metadata.as_ref(), "bob", Role::Operations).await;

    let (status, _) = server
        .json_request(
            "POST",
            "/api/v4/cdn_locks",
            Some(json!({"cdn": "cdn1", "soft": false})),
            Some(&alice),
        )
        .await;
    assert_eq!(status, 201);

    let (status, _, _) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "changed")),
            Some(&bob),
            &[("If-Match", "\"v1-stale\"")],
        )
        .await;
    assert_eq!(status, 412);

    let (status, _, body) = server
        .request_with_headers(
            "PUT",
            &format!("/api/v4/profiles/{}", profile.id),
            Some(update_body(&profile, "changed")),
            Some(&bob),
            &[("If-Match", "*")],
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["code"], "cdn_locked");
}
