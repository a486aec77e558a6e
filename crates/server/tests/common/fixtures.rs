//! Test fixtures for seeding CDNs, tokens, profiles and parameters.

use keel_core::token::hash_token;
use keel_core::{ProfileDraft, Role};
use keel_metadata::MetadataStore;
use keel_metadata::models::{CdnRow, NewParameter, ParameterRow, ProfileRow, TokenRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Raw admin token matching `AdminConfig::for_testing()`.
#[allow(dead_code)]
pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

/// Create a token for `username` with `role` and return the raw secret.
#[allow(dead_code)]
pub async fn create_test_token(metadata: &dyn MetadataStore, username: &str, role: Role) -> String {
    let raw_token = format!("test-token-{}", Uuid::new_v4());
    let token = TokenRow {
        token_id: Uuid::new_v4(),
        token_hash: hash_token(&raw_token),
        username: username.to_string(),
        role: role.as_str().to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: OffsetDateTime::now_utc(),
        last_used_at: None,
        description: Some("Test Token".to_string()),
    };
    metadata
        .create_token(&token)
        .await
        .expect("Failed to create token");
    raw_token
}

/// Create a CDN named `name`.
#[allow(dead_code)]
pub async fn create_test_cdn(metadata: &dyn MetadataStore, name: &str) -> CdnRow {
    metadata
        .create_cdn(name, &format!("{name}.example.net"), false)
        .await
        .expect("Failed to create cdn")
}

/// A valid draft for a cache server profile on `cdn_id`.
#[allow(dead_code)]
pub fn profile_draft(name: &str, cdn_id: i64) -> ProfileDraft {
    ProfileDraft {
        name: name.to_string(),
        description: format!("{name} description"),
        profile_type: "ATS_PROFILE".to_string(),
        cdn_id,
        routing_disabled: false,
    }
}

/// Create a profile directly in the store.
#[allow(dead_code)]
pub async fn create_test_profile(
    metadata: &dyn MetadataStore,
    name: &str,
    cdn_id: i64,
) -> ProfileRow {
    metadata
        .create_profile(&profile_draft(name, cdn_id), "fixture")
        .await
        .expect("Failed to create profile")
}

/// Create a parameter directly in the store.
#[allow(dead_code)]
pub async fn create_test_parameter(
    metadata: &dyn MetadataStore,
    name: &str,
    config_file: &str,
    value: &str,
) -> ParameterRow {
    metadata
        .create_parameter(&NewParameter {
            name: name.to_string(),
            config_file: config_file.to_string(),
            value: value.to_string(),
            secure: false,
        })
        .await
        .expect("Failed to create parameter")
}
