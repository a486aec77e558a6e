//! Tests for bootstrap admin token initialization and the token endpoints.

mod common;

use axum::http::StatusCode;
use common::{TEST_ADMIN_TOKEN, TestMetadata, TestServer, create_test_token};
use keel_core::Role;
use keel_core::token::hash_token;
use keel_core::config::AdminConfig;
use keel_metadata::models::TokenRow;
use keel_server::bootstrap::ensure_admin_token;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn admin_config(raw_token: &str) -> AdminConfig {
    AdminConfig {
        token_hash: format!("sha256:{}", hash_token(raw_token)),
        username: "admin".to_string(),
    }
}

fn token_row(raw_token: &str, role: Role) -> TokenRow {
    TokenRow {
        token_id: Uuid::new_v4(),
        token_hash: hash_token(raw_token),
        username: "someone".to_string(),
        role: role.as_str().to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: None,
    }
}

// =============================================================================
// Bootstrap token
// =============================================================================

#[tokio::test]
async fn test_bootstrap_creates_token_when_none_exists() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();

    assert!(metadata.get_bootstrap_token_id().await.unwrap().is_none());

    ensure_admin_token(metadata.as_ref(), &admin_config("my-secret-bootstrap-token"))
        .await
        .expect("Bootstrap should succeed");

    let bootstrap_id = metadata
        .get_bootstrap_token_id()
        .await
        .unwrap()
        .expect("Bootstrap token should exist");
    let token = metadata.get_token(bootstrap_id).await.unwrap().unwrap();

    assert_eq!(token.token_hash, hash_token("my-secret-bootstrap-token"));
    assert_eq!(token.username, "admin");
    assert_eq!(token.role, "admin");
    assert!(token.revoked_at.is_none());
    assert!(token.expires_at.is_none());
}

#[tokio::test]
async fn test_bootstrap_accepts_uppercase_hash_without_prefix() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();

    let config = AdminConfig {
        token_hash: hash_token("shouty").to_uppercase(),
        username: "root".to_string(),
    };
    ensure_admin_token(metadata.as_ref(), &config).await.unwrap();

    let token = metadata
        .get_token_by_hash(&hash_token("shouty"))
        .await
        .unwrap()
        .expect("Token should be stored lowercase");
    assert_eq!(token.username, "root");
}

#[tokio::test]
async fn test_bootstrap_reuses_existing_valid_token() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();

    let existing = token_row("existing-bootstrap-token", Role::Admin);
    metadata.create_token(&existing).await.unwrap();

    ensure_admin_token(metadata.as_ref(), &admin_config("existing-bootstrap-token"))
        .await
        .expect("Bootstrap should succeed");

    let bootstrap_id = metadata.get_bootstrap_token_id().await.unwrap();
    assert_eq!(bootstrap_id, Some(existing.token_id));
    assert_eq!(metadata.list_tokens().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_bootstrap_rejects_unusable_tokens() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();
    let now = OffsetDateTime::now_utc();

    let mut revoked = token_row("revoked", Role::Admin);
    revoked.revoked_at = Some(now);
    metadata.create_token(&revoked).await.unwrap();

    let mut expired = token_row("expired", Role::Admin);
    expired.expires_at = Some(now - Duration::hours(1));
    metadata.create_token(&expired).await.unwrap();

    metadata
        .create_token(&token_row("operator", Role::Operations))
        .await
        .unwrap();

    for (raw, expected) in [
        ("revoked", "revoked"),
        ("expired", "expired"),
        ("operator", "non-admin"),
    ] {
        let err = ensure_admin_token(metadata.as_ref(), &admin_config(raw))
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains(expected), "expected {expected:?} in {err:?}");
    }
}

#[tokio::test]
async fn test_bootstrap_revokes_old_token_when_hash_changes() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();

    ensure_admin_token(metadata.as_ref(), &admin_config("old-bootstrap-token"))
        .await
        .unwrap();
    let old_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();

    ensure_admin_token(metadata.as_ref(), &admin_config("new-bootstrap-token"))
        .await
        .unwrap();
    let new_id = metadata.get_bootstrap_token_id().await.unwrap().unwrap();
    assert_ne!(new_id, old_id);

    let old = metadata.get_token(old_id).await.unwrap().unwrap();
    assert!(old.revoked_at.is_some(), "Old token should be revoked");
    let new = metadata.get_token(new_id).await.unwrap().unwrap();
    assert!(new.revoked_at.is_none());
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_config() {
    let test = TestMetadata::new().await.unwrap();
    let metadata = test.store();

    for token_hash in [
        "sha256:abc123".to_string(),
        format!("sha256:{}", "g".repeat(64)),
        String::new(),
    ] {
        let config = AdminConfig {
            token_hash,
            username: "admin".to_string(),
        };
        assert!(ensure_admin_token(metadata.as_ref(), &config).await.is_err());
    }

    let config = AdminConfig {
        username: "  ".to_string(),
        ..admin_config("fine")
    };
    assert!(ensure_admin_token(metadata.as_ref(), &config).await.is_err());
    assert!(metadata.list_tokens().await.unwrap().is_empty());
}

// =============================================================================
// Token endpoints
// =============================================================================

#[tokio::test]
async fn test_create_token_and_use_it() {
    let server = TestServer::new().await;

    let (status, body) = server
        .json_request(
            "POST",
            "/api/v4/tokens",
            Some(json!({
                "username": "alice",
                "role": "operations",
                "expiresInSecs": 3600,
                "description": "alice laptop",
            })),
            Some(TEST_ADMIN_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    assert_eq!(body["response"]["username"], "alice");
    assert_eq!(body["response"]["role"], "operations");
    assert!(body["response"]["expiresAt"].is_string());
    let secret = body["response"]["tokenSecret"].as_str().unwrap().to_string();

    // The new token can take a lock in alice's name.
    server
        .metadata()
        .create_cdn("cdn1", "cdn1.example.net", false)
        .await
        .unwrap();
    let (status, body) = server
        .json_request(
            "POST",
            "/api/v4/cdn_locks",
            Some(json!({"cdn": "cdn1"})),
            Some(&secret),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["response"]["userName"], "alice");
}

#[tokio::test]
async fn test_create_token_validation() {
    let server = TestServer::new().await;

    let (status, _) = server
        .json_request(
            "POST",
            "/api/v4/tokens",
            Some(json!({"username": "alice", "role": "superuser"})),
            Some(TEST_ADMIN_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .json_request(
            "POST",
            "/api/v4/tokens",
            Some(json!({"username": " ", "role": "operations"})),
            Some(TEST_ADMIN_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_tokens_hides_hashes() {
    let server = TestServer::new().await;
    create_test_token(server.metadata().as_ref(), "bob", Role::ReadOnly).await;

    let (status, body) = server
        .json_request("GET", "/api/v4/tokens", None, Some(TEST_ADMIN_TOKEN))
        .await;
    assert_eq!(status, StatusCode::OK);

    let tokens = body["response"].as_array().unwrap();
    assert_eq!(tokens.len(), 2);
    let bob = tokens.iter().find(|t| t["username"] == "bob").unwrap();
    assert_eq!(bob["role"], "read-only");
    assert!(bob.get("tokenHash").is_none());
    assert!(bob.get("tokenSecret").is_none());
}

#[tokio::test]
async fn test_token_endpoints_require_admin() {
    let server = TestServer::new().await;
    let ops = create_test_token(server.metadata().as_ref(), "ops", Role::Operations).await;

    let (status, _) = server
        .json_request("GET", "/api/v4/tokens", None, Some(&ops))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = server
        .json_request(
            "POST",
            "/api/v4/tokens",
            Some(json!({"username": "ops", "role": "admin"})),
            Some(&ops),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_revoke_token() {
    let server = TestServer::new().await;
    let metadata = server.metadata();
    let raw = create_test_token(metadata.as_ref(), "bob", Role::Operations).await;
    let token = metadata
        .get_token_by_hash(&hash_token(&raw))
        .await
        .unwrap()
        .unwrap();

    let (status, _) = server
        .json_request("GET", "/api/v4/cdns", None, Some(&raw))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server
        .json_request(
            "DELETE",
            &format!("/api/v4/tokens/{}", token.token_id),
            None,
            Some(TEST_ADMIN_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = server
        .json_request("GET", "/api/v4/cdns", None, Some(&raw))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server
        .json_request(
            "DELETE",
            &format!("/api/v4/tokens/{}", Uuid::new_v4()),
            None,
            Some(TEST_ADMIN_TOKEN),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server
        .json_request("DELETE", "/api/v4/tokens/not-a-uuid", None, Some(TEST_ADMIN_TOKEN))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
