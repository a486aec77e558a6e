//! API token management (admin only).

use super::common::{Envelope, format_timestamp, read_json};
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use keel_core::Role;
use keel_core::token::hash_token;
use keel_metadata::models::TokenRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Create token request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    /// User the token acts as.
    pub username: String,
    /// One of `admin`, `operations`, `read-only`.
    pub role: String,
    pub expires_in_secs: Option<u64>,
    pub description: Option<String>,
}

/// Create token response. The secret is shown only here.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub token_id: String,
    pub token_secret: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<String>,
}

/// Token listing entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token_id: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub description: Option<String>,
}

fn token_info(row: TokenRow) -> ApiResult<TokenInfo> {
    Ok(TokenInfo {
        token_id: row.token_id.to_string(),
        expires_at: row.expires_at.map(format_timestamp).transpose()?,
        revoked_at: row.revoked_at.map(format_timestamp).transpose()?,
        created_at: format_timestamp(row.created_at)?,
        last_used_at: row.last_used_at.map(format_timestamp).transpose()?,
        username: row.username,
        role: row.role,
        description: row.description,
    })
}

/// Generate a random token secret using a cryptographically secure RNG.
fn generate_token_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// POST /api/v4/tokens - Create a token for a user.
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Envelope<CreateTokenResponse>>)> {
    require_auth(&req)?.require_admin()?;
    let body: CreateTokenRequest = read_json(req, state.max_body_size()).await?;

    if body.username.trim().is_empty() {
        return Err(ApiError::BadRequest("username cannot be blank".to_string()));
    }
    let role = Role::parse(&body.role)?;

    let token_secret = generate_token_secret();
    let now = OffsetDateTime::now_utc();
    let expires_at = match body.expires_in_secs {
        Some(secs) => {
            let secs_i64: i64 = secs.try_into().map_err(|_| {
                ApiError::BadRequest(format!("expiresInSecs too large: {secs}"))
            })?;
            Some(now + time::Duration::seconds(secs_i64))
        }
        None => None,
    };

    let token_row = TokenRow {
        token_id: Uuid::new_v4(),
        token_hash: hash_token(&token_secret),
        username: body.username,
        role: role.as_str().to_string(),
        expires_at,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: body.description,
    };
    state.metadata.create_token(&token_row).await?;
    tracing::info!(token_id = %token_row.token_id, username = %token_row.username, role = %role, "Token created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_success(
            CreateTokenResponse {
                token_id: token_row.token_id.to_string(),
                token_secret,
                username: token_row.username,
                role: token_row.role,
                expires_at: expires_at.map(format_timestamp).transpose()?,
            },
            "token was created.",
        )),
    ))
}

/// GET /api/v4/tokens - List tokens.
pub async fn list_tokens(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Envelope<Vec<TokenInfo>>>> {
    require_auth(&req)?.require_admin()?;
    let tokens = state
        .metadata
        .list_tokens()
        .await?
        .into_iter()
        .map(token_info)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(Envelope::new(tokens)))
}

/// DELETE /api/v4/tokens/{token_id} - Revoke a token.
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_auth(&req)?.require_admin()?;

    let token_id = Uuid::parse_str(&token_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid token ID: {e}")))?;
    if state.metadata.get_token(token_id).await?.is_none() {
        return Err(ApiError::NotFound("token not found".to_string()));
    }

    state
        .metadata
        .revoke_token(token_id, OffsetDateTime::now_utc())
        .await?;
    tracing::info!(token_id = %token_id, "Token revoked");

    Ok(StatusCode::NO_CONTENT)
}
