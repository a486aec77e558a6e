//! Profile handlers: CRUD, copy, export and import.

use super::common::{
    Alert, Envelope, format_timestamp, not_modified, parse_id, parse_optional_id, read_conditions,
    read_json, validator_headers, write_conditions,
};
use super::parameters::{ParameterResponse, REDACTED_VALUE, parameter_response};
use crate::auth::{AuthenticatedUser, require_auth};
use crate::error::{ApiError, ApiResult};
use crate::metrics::record_profile_mutation;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::response::{IntoResponse, Response};
use keel_core::{Outcome, PageParams, ProfileDraft};
use keel_metadata::models::{NewParameter, ProfileFilter, ProfileImport, ProfileRow};
use serde::{Deserialize, Serialize};

// =============================================================================
// Request/response types
// =============================================================================

/// Profile as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub cdn: i64,
    pub cdn_name: String,
    pub routing_disabled: bool,
    pub last_updated: String,
    /// Present only when the profile was requested by ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<ParameterResponse>>,
}

fn profile_response(row: ProfileRow) -> ApiResult<ProfileResponse> {
    Ok(ProfileResponse {
        id: row.id,
        last_updated: format_timestamp(row.last_updated)?,
        name: row.name,
        description: row.description,
        profile_type: row.profile_type,
        cdn: row.cdn,
        cdn_name: row.cdn_name,
        routing_disabled: row.routing_disabled,
        params: None,
    })
}

/// Body of a profile create or full replace.
///
/// Every field defaults so missing fields surface as validation errors
/// rather than decode errors.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRequest {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub cdn: i64,
    pub routing_disabled: bool,
}

impl From<ProfileRequest> for ProfileDraft {
    fn from(req: ProfileRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            profile_type: req.profile_type,
            cdn_id: req.cdn,
            routing_disabled: req.routing_disabled,
        }
    }
}

/// Query string accepted by `GET /profiles`.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileListParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub cdn: Option<String>,
    /// Single parameter ID.
    pub param: Option<String>,
    /// Comma-separated parameter IDs.
    pub params: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

impl ProfileListParams {
    fn filter(&self) -> ApiResult<ProfileFilter> {
        let mut parameters = Vec::new();
        if let Some(param) = self.param.as_deref() {
            parameters.push(parse_id("param", param)?);
        }
        if let Some(params) = self.params.as_deref() {
            for raw in params.split(',').filter(|s| !s.trim().is_empty()) {
                parameters.push(parse_id("params", raw)?);
            }
        }
        Ok(ProfileFilter {
            id: parse_optional_id("id", self.id.as_deref())?,
            name: self.name.clone(),
            cdn: parse_optional_id("cdn", self.cdn.as_deref())?,
            parameters,
        })
    }
}

/// Body of `POST /profiles/copy`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyProfileRequest {
    /// Name of the new profile.
    pub name: String,
    /// Name of the profile to copy from.
    pub existing_name: String,
}

/// Response of a profile copy.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyProfileResponse {
    pub id: i64,
    pub name: String,
    pub existing_id: i64,
    pub existing_name: String,
    pub description: String,
}

/// Portable profile fields used by export and import.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedProfile {
    pub name: String,
    pub description: String,
    /// CDN name.
    pub cdn: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    #[serde(default)]
    pub routing_disabled: bool,
}

/// Portable parameter. Secure values are redacted for non-admins.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportedParameter {
    pub name: String,
    pub config_file: String,
    pub value: String,
    #[serde(default)]
    pub secure: bool,
}

/// Export document. Import accepts the same shape.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileExportDocument {
    pub profile: ExportedProfile,
    #[serde(default)]
    pub parameters: Vec<ExportedParameter>,
}

/// Response of a profile import.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProfileResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub profile_type: String,
    pub cdn_name: String,
}

fn writer(req: &Request) -> ApiResult<AuthenticatedUser> {
    let auth = require_auth(req)?;
    auth.require_write()?;
    Ok(auth.clone())
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /api/v4/profiles - List profiles.
///
/// Filtering by `id` includes each profile's parameters; other filters do
/// not. Honors `If-Modified-Since` against the newest profile returned.
pub async fn list_profiles(
    State(state): State<AppState>,
    Query(params): Query<ProfileListParams>,
    req: Request,
) -> ApiResult<Response> {
    let is_admin = require_auth(&req)?.is_admin();
    let conditions = read_conditions(req.headers());
    let filter = params.filter()?;
    let query = params.page.resolve()?;

    let rows = state.metadata.list_profiles(&filter, &query).await?;

    if conditions.evaluate_all(rows.iter().map(|r| r.last_updated)) == Outcome::NotModified {
        return Ok(not_modified());
    }

    // A single profile by ID carries its validators.
    let headers = match (filter.id, rows.as_slice()) {
        (Some(_), [only]) => Some(validator_headers(only.last_updated)?),
        _ => None,
    };

    let mut profiles = Vec::with_capacity(rows.len());
    for row in rows {
        let id = row.id;
        let mut profile = profile_response(row)?;
        if filter.id.is_some() {
            let parameters = state.metadata.get_profile_parameters(id).await?;
            profile.params = Some(
                parameters
                    .into_iter()
                    .map(|p| parameter_response(p, is_admin))
                    .collect::<ApiResult<_>>()?,
            );
        }
        profiles.push(profile);
    }

    let body = Json(Envelope::new(profiles));
    Ok(match headers {
        Some(headers) => (headers, body).into_response(),
        None => body.into_response(),
    })
}

/// POST /api/v4/profiles - Create a profile.
pub async fn create_profile(State(state): State<AppState>, req: Request) -> ApiResult<Response> {
    let auth = writer(&req)?;
    let body: ProfileRequest = read_json(req, state.max_body_size()).await?;
    let draft = ProfileDraft::from(body);

    let row = state
        .metadata
        .create_profile(&draft, auth.username())
        .await?;
    record_profile_mutation("create");

    let headers = validator_headers(row.last_updated)?;
    let body = Envelope::with_success(profile_response(row)?, "profile was created.");
    Ok((headers, Json(body)).into_response())
}

/// PUT /api/v4/profiles/{id} - Replace a profile.
///
/// Honors `If-Unmodified-Since` and `If-Match`.
pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let auth = writer(&req)?;
    let id = parse_id("id", &id)?;
    let conditions = write_conditions(req.headers());
    let body: ProfileRequest = read_json(req, state.max_body_size()).await?;
    let draft = ProfileDraft::from(body);

    let row = state
        .metadata
        .update_profile(id, &draft, auth.username(), &conditions)
        .await?;
    record_profile_mutation("update");

    let headers = validator_headers(row.last_updated)?;
    let body = Envelope::with_success(profile_response(row)?, "profile was updated.");
    Ok((headers, Json(body)).into_response())
}

/// DELETE /api/v4/profiles/{id} - Delete a profile and its associations.
///
/// Honors `If-Unmodified-Since` and `If-Match`.
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<Envelope<()>>> {
    let auth = writer(&req)?;
    let id = parse_id("id", &id)?;
    let conditions = write_conditions(req.headers());

    state
        .metadata
        .delete_profile(id, auth.username(), &conditions)
        .await?;
    record_profile_mutation("delete");

    Ok(Json(Envelope {
        response: None,
        alerts: vec![Alert::success("profile was deleted.")],
    }))
}

/// POST /api/v4/profiles/copy - Copy a profile and its parameters.
pub async fn copy_profile(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Envelope<CopyProfileResponse>>> {
    let auth = writer(&req)?;
    let body: CopyProfileRequest = read_json(req, state.max_body_size()).await?;

    let copied = state
        .metadata
        .copy_profile(&body.existing_name, &body.name, auth.username())
        .await?;
    record_profile_mutation("copy");

    let message = format!(
        "created new profile [{}] from existing profile [{}]",
        copied.created.name, copied.source.name
    );
    Ok(Json(Envelope::with_success(
        CopyProfileResponse {
            id: copied.created.id,
            name: copied.created.name,
            existing_id: copied.source.id,
            existing_name: copied.source.name,
            description: copied.created.description,
        },
        message,
    )))
}

/// GET|POST /api/v4/profiles/{id}/export - Export a profile with its parameters.
///
/// The document is returned bare, not wrapped in an envelope, so it can be
/// posted back to the import endpoint as-is.
pub async fn export_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> ApiResult<Json<ProfileExportDocument>> {
    let is_admin = require_auth(&req)?.is_admin();
    let id = parse_id("id", &id)?;

    let export = state
        .metadata
        .export_profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("profile {id} not found")))?;

    Ok(Json(ProfileExportDocument {
        profile: ExportedProfile {
            name: export.profile.name,
            description: export.profile.description,
            cdn: export.profile.cdn_name,
            profile_type: export.profile.profile_type,
            routing_disabled: export.profile.routing_disabled,
        },
        parameters: export
            .parameters
            .into_iter()
            .map(|p| ExportedParameter {
                value: if p.secure && !is_admin {
                    REDACTED_VALUE.to_string()
                } else {
                    p.value
                },
                name: p.name,
                config_file: p.config_file,
                secure: p.secure,
            })
            .collect(),
    }))
}

/// POST /api/v4/profiles/import - Import an exported profile.
pub async fn import_profile(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<Json<Envelope<ImportProfileResponse>>> {
    let auth = writer(&req)?;
    let doc: ProfileExportDocument = read_json(req, state.max_body_size()).await?;
    let parameter_count = doc.parameters.len();

    // A redacted export cannot recreate its secure values.
    if let Some(p) = doc
        .parameters
        .iter()
        .find(|p| p.secure && p.value == REDACTED_VALUE)
    {
        return Err(ApiError::BadRequest(format!(
            "secure parameter {} in {} has a redacted value",
            p.name, p.config_file
        )));
    }

    let import = ProfileImport {
        name: doc.profile.name,
        description: doc.profile.description,
        cdn_name: doc.profile.cdn,
        profile_type: doc.profile.profile_type,
        routing_disabled: doc.profile.routing_disabled,
        parameters: doc
            .parameters
            .into_iter()
            .map(|p| NewParameter {
                name: p.name,
                config_file: p.config_file,
                value: p.value,
                secure: p.secure,
            })
            .collect(),
    };

    let row = state
        .metadata
        .import_profile(&import, auth.username())
        .await?;
    record_profile_mutation("import");

    let message = format!(
        "profile [{}] imported with {parameter_count} parameters",
        row.name
    );
    Ok(Json(Envelope::with_success(
        ImportProfileResponse {
            id: row.id,
            name: row.name,
            description: row.description,
            profile_type: row.profile_type,
            cdn_name: row.cdn_name,
        },
        message,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_filter() {
        let params = ProfileListParams {
            id: Some("3".to_string()),
            param: Some("5".to_string()),
            params: Some("6,7".to_string()),
            ..Default::default()
        };
        let filter = params.filter().unwrap();
        assert_eq!(filter.id, Some(3));
        assert_eq!(filter.parameters, vec![5, 6, 7]);
    }

    #[test]
    fn test_list_params_reject_bad_ids() {
        let params = ProfileListParams {
            cdn: Some("x".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.filter(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_profile_request_defaults_missing_fields() {
        let req: ProfileRequest = serde_json::from_str(r#"{"name": "EDGE1"}"#).unwrap();
        let draft = ProfileDraft::from(req);
        assert_eq!(draft.cdn_id, 0);
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_export_document_routing_disabled_optional() {
        let doc: ProfileExportDocument = serde_json::from_str(
            r#"{"profile": {"name": "P", "description": "d", "cdn": "cdn1", "type": "ATS_PROFILE"}}"#,
        )
        .unwrap();
        assert!(!doc.profile.routing_disabled);
        assert!(doc.parameters.is_empty());
    }
}
