//! CDN lock handlers.

use super::common::{Envelope, format_timestamp, read_json};
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_lock_acquired;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use keel_metadata::models::CdnLockRow;
use serde::{Deserialize, Serialize};

/// Lock as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnLockResponse {
    pub cdn: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub soft: bool,
    pub last_updated: String,
}

fn lock_response(row: CdnLockRow) -> ApiResult<CdnLockResponse> {
    Ok(CdnLockResponse {
        last_updated: format_timestamp(row.last_updated)?,
        cdn: row.cdn,
        user_name: row.username,
        message: row.message,
        soft: row.soft,
    })
}

fn default_soft() -> bool {
    true
}

/// Body of `POST /cdn_locks`.
#[derive(Debug, Deserialize)]
pub struct CreateLockRequest {
    /// CDN name.
    pub cdn: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Locks are soft unless asked otherwise.
    #[serde(default = "default_soft")]
    pub soft: bool,
}

/// Query string accepted by `GET /cdn_locks`.
#[derive(Debug, Default, Deserialize)]
pub struct LockListParams {
    pub cdn: Option<String>,
    pub username: Option<String>,
}

/// Query string accepted by `DELETE /cdn_locks`.
#[derive(Debug, Deserialize)]
pub struct LockDeleteParams {
    pub cdn: Option<String>,
}

/// GET /api/v4/cdn_locks - List locks.
pub async fn list_locks(
    State(state): State<AppState>,
    Query(params): Query<LockListParams>,
    req: Request,
) -> ApiResult<Json<Envelope<Vec<CdnLockResponse>>>> {
    require_auth(&req)?;
    let locks = state
        .metadata
        .list_locks(params.cdn.as_deref(), params.username.as_deref())
        .await?
        .into_iter()
        .map(lock_response)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(Envelope::new(locks)))
}

/// POST /api/v4/cdn_locks - Acquire a lock on a CDN.
///
/// Re-acquiring a lock you hold, or taking over a soft lock, replaces it.
pub async fn create_lock(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Envelope<CdnLockResponse>>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_write()?;
    let body: CreateLockRequest = read_json(req, state.max_body_size()).await?;
    if body.cdn.trim().is_empty() {
        return Err(ApiError::BadRequest("cdn cannot be blank".to_string()));
    }

    let row = state
        .metadata
        .acquire_lock(
            &body.cdn,
            auth.username(),
            body.soft,
            body.message.as_deref(),
        )
        .await?;
    record_lock_acquired(row.soft);
    tracing::info!(cdn = %row.cdn, username = %row.username, soft = row.soft, "CDN lock acquired");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_success(lock_response(row)?, "CDN lock acquired!")),
    ))
}

/// DELETE /api/v4/cdn_locks?cdn={name} - Release a lock.
///
/// Owners release their own locks; admins may release anyone's.
pub async fn delete_lock(
    State(state): State<AppState>,
    Query(params): Query<LockDeleteParams>,
    req: Request,
) -> ApiResult<Json<Envelope<CdnLockResponse>>> {
    let auth = require_auth(&req)?.clone();
    auth.require_write()?;
    let cdn = params
        .cdn
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("cdn query parameter is required".to_string()))?;

    let row = state
        .metadata
        .release_lock(&cdn, auth.username(), auth.is_admin())
        .await?;
    if row.username != auth.username() {
        tracing::warn!(cdn = %row.cdn, owner = %row.username, admin = %auth.username(), "CDN lock released by admin");
    } else {
        tracing::info!(cdn = %row.cdn, username = %row.username, "CDN lock released");
    }

    Ok(Json(Envelope::with_success(
        lock_response(row)?,
        "Cdn unlocked",
    )))
}
