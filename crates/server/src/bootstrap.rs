//! Admin token initialization.

use anyhow::{Result, bail};
use keel_core::Role;
use keel_core::config::AdminConfig;
use keel_metadata::MetadataStore;
use keel_metadata::models::TokenRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin token exists, rotating the previous one if needed.
///
/// If the token hash changes between restarts, the previous admin token is
/// revoked and a new one is created with the new hash, in one transaction.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    // Stored hashes are lowercase hex.
    let hash = config
        .token_hash
        .strip_prefix("sha256:")
        .unwrap_or(&config.token_hash)
        .to_lowercase();
    let hash = hash.as_str();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    if config.username.trim().is_empty() {
        bail!("invalid admin username: cannot be blank");
    }

    let now = OffsetDateTime::now_utc();
    if let Some(existing) = metadata.get_token_by_hash(hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); \
                 use a new token hash",
                existing.token_id
            );
        }
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={}); \
                 use a new token hash",
                existing.token_id,
                expires_at
            );
        }
        if existing.role != Role::Admin.as_str() {
            bail!(
                "admin token hash matches a non-admin token (id={}, role={})",
                existing.token_id,
                existing.role
            );
        }
        metadata.set_bootstrap_token_id(existing.token_id).await?;
        tracing::debug!("Admin token already exists");
        return Ok(());
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        token_hash: hash.to_string(),
        username: config.username.clone(),
        role: Role::Admin.as_str().to_string(),
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: Some("bootstrap admin token".to_string()),
    };

    if let Some(prev_id) = metadata.rotate_bootstrap_token(&token, now).await? {
        tracing::info!(token_id = %prev_id, "Previous admin token revoked");
    }
    tracing::info!(token_id = %token.token_id, username = %token.username, "Admin token created");

    Ok(())
}
