//! CDN handlers.

use super::common::{Envelope, format_timestamp, parse_id, read_json};
use crate::auth::require_auth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use keel_metadata::models::CdnRow;
use serde::{Deserialize, Serialize};

/// CDN as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnResponse {
    pub id: i64,
    pub name: String,
    pub domain_name: String,
    pub dnssec_enabled: bool,
    pub last_updated: String,
}

fn cdn_response(row: CdnRow) -> ApiResult<CdnResponse> {
    Ok(CdnResponse {
        id: row.id,
        last_updated: format_timestamp(row.last_updated)?,
        name: row.name,
        domain_name: row.domain_name,
        dnssec_enabled: row.dnssec_enabled,
    })
}

/// Body of `POST /cdns`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCdnRequest {
    pub name: String,
    pub domain_name: String,
    #[serde(default)]
    pub dnssec_enabled: bool,
}

fn validate_cdn(body: &CreateCdnRequest) -> ApiResult<()> {
    let mut problems = Vec::new();
    if body.name.trim().is_empty() {
        problems.push("name cannot be blank");
    } else if body.name.contains(char::is_whitespace) {
        problems.push("name cannot contain spaces");
    }
    if body.domain_name.trim().is_empty() {
        problems.push("domainName cannot be blank");
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ApiError::BadRequest(problems.join("; ")))
    }
}

/// GET /api/v4/cdns - List CDNs.
pub async fn list_cdns(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Envelope<Vec<CdnResponse>>>> {
    require_auth(&req)?;
    let cdns = state
        .metadata
        .list_cdns()
        .await?
        .into_iter()
        .map(cdn_response)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(Json(Envelope::new(cdns)))
}

/// GET /api/v4/cdns/{id} - Get a CDN.
pub async fn get_cdn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<Envelope<CdnResponse>>> {
    require_auth(&req)?;
    let id = parse_id("id", &id)?;
    let row = state
        .metadata
        .get_cdn(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("cdn {id} not found")))?;
    Ok(Json(Envelope::new(cdn_response(row)?)))
}

/// POST /api/v4/cdns - Create a CDN (admin only).
pub async fn create_cdn(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<Envelope<CdnResponse>>)> {
    require_auth(&req)?.require_admin()?;
    let body: CreateCdnRequest = read_json(req, state.max_body_size()).await?;
    validate_cdn(&body)?;

    let row = state
        .metadata
        .create_cdn(&body.name, &body.domain_name, body.dnssec_enabled)
        .await?;
    tracing::info!(cdn_id = row.id, name = %row.name, "CDN created");

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_success(cdn_response(row)?, "cdn was created.")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cdn() {
        let ok = CreateCdnRequest {
            name: "cdn1".to_string(),
            domain_name: "cdn1.example.net".to_string(),
            dnssec_enabled: false,
        };
        assert!(validate_cdn(&ok).is_ok());

        let bad = CreateCdnRequest {
            name: "my cdn".to_string(),
            domain_name: String::new(),
            dnssec_enabled: false,
        };
        let err = validate_cdn(&bad).unwrap_err().to_string();
        assert!(err.contains("cannot contain spaces"));
        assert!(err.contains("domainName cannot be blank"));
    }
}
