//! Parameter and profile-parameter association handlers.

use super::common::{Alert, Envelope, OneOrMany, format_timestamp, parse_id, read_json};
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use keel_core::profile::validate_parameter;
use keel_metadata::models::{NewParameter, ParameterFilter, ParameterRow, ProfileParameterRow};
use serde::{Deserialize, Serialize};

/// Value shown in place of a secure parameter's value to non-admins.
pub(crate) const REDACTED_VALUE: &str = "********";

/// Parameter as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterResponse {
    pub id: i64,
    pub name: String,
    pub config_file: String,
    pub value: String,
    pub secure: bool,
    pub last_updated: String,
}

/// Convert a row, hiding secure values unless `reveal_secure` is set.
pub fn parameter_response(row: ParameterRow, reveal_secure: bool) -> ApiResult<ParameterResponse> {
    let value = if row.secure && !reveal_secure {
        REDACTED_VALUE.to_string()
    } else {
        row.value
    };
    Ok(ParameterResponse {
        id: row.id,
        last_updated: format_timestamp(row.last_updated)?,
        name: row.name,
        config_file: row.config_file,
        value,
        secure: row.secure,
    })
}

/// Body of `POST /parameters`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParameterRequest {
    pub name: String,
    pub config_file: String,
    pub value: String,
    #[serde(default)]
    pub secure: bool,
}

/// Query string accepted by `GET /parameters`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterListParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub config_file: Option<String>,
    pub value: Option<String>,
}

/// One requested association.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileParameterRequest {
    pub profile_id: i64,
    pub parameter_id: i64,
}

/// Association as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileParameterResponse {
    pub profile: i64,
    pub parameter: i64,
    pub last_updated: String,
}

fn association_response(row: ProfileParameterRow) -> ApiResult<ProfileParameterResponse> {
    Ok(ProfileParameterResponse {
        profile: row.profile,
        parameter: row.parameter,
        last_updated: format_timestamp(row.last_updated)?,
    })
}

/// GET /api/v4/parameters - List parameters.
pub async fn list_parameters(
    State(state): State<AppState>,
    Query(params): Query<ParameterListParams>,
    req: Request,
) -> ApiResult<Json<Envelope<Vec<ParameterResponse>>>> {
    let is_admin = require_auth(&req)?.is_admin();

    let filter = ParameterFilter {
        id: params
            .id
            .as_deref()
            .map(|raw| parse_id("id", raw))
            .transpose()?,
        name: params.name,
        config_file: params.config_file,
        value: params.value,
    };

    let rows = state.metadata.list_parameters(&filter).await?;
    let parameters = rows
        .into_iter()
        .map(|row| parameter_response(row, is_admin))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(Envelope::new(parameters)))
}

/// POST /api/v4/parameters - Create a parameter.
pub async fn create_parameter(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Envelope<ParameterResponse>>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_write()?;
    let body: CreateParameterRequest = read_json(req, state.max_body_size()).await?;
    validate_parameter(&body.name, &body.config_file)?;

    let row = state
        .metadata
        .create_parameter(&NewParameter {
            name: body.name,
            config_file: body.config_file,
            value: body.value,
            secure: body.secure,
        })
        .await?;
    tracing::info!(parameter_id = row.id, name = %row.name, config_file = %row.config_file, "Parameter created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_success(
            parameter_response(row, auth.is_admin())?,
            "parameter was created.",
        )),
    ))
}

/// DELETE /api/v4/parameters/{id} - Delete a parameter.
///
/// Associations go with it. Rejected while any profile using it sits on a CDN
/// hard-locked by another user.
pub async fn delete_parameter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<Envelope<()>>> {
    let auth = require_auth(&req)?.clone();
    auth.require_write()?;
    let id = parse_id("id", &id)?;

    state.metadata.delete_parameter(id, auth.username()).await?;

    Ok(Json(Envelope {
        response: None,
        alerts: vec![Alert::success("parameter was deleted.")],
    }))
}

/// POST /api/v4/profileparameters - Associate parameters with profiles.
///
/// Accepts a single association or an array; all are created or none.
pub async fn create_profile_parameters(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Envelope<Vec<ProfileParameterResponse>>>)> {
    let auth = require_auth(&req)?.clone();
    auth.require_write()?;
    let body: OneOrMany<ProfileParameterRequest> = read_json(req, state.max_body_size()).await?;

    let pairs: Vec<(i64, i64)> = body
        .into_vec()
        .into_iter()
        .map(|a| (a.profile_id, a.parameter_id))
        .collect();
    if pairs.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one association is required".to_string(),
        ));
    }

    let rows = state
        .metadata
        .associate_parameters(&pairs, auth.username())
        .await?;
    metrics::PARAMETER_ASSOCIATIONS.inc_by(rows.len() as u64);
    tracing::info!(count = rows.len(), "Profile parameters associated");

    let message = format!("{} profile parameter associations were created.", rows.len());
    let associations = rows
        .into_iter()
        .map(association_response)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_success(associations, message)),
    ))
}
