//! Shared handler helpers: response envelope, body parsing and conditional
//! request headers.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use axum::extract::Request;
use axum::http::header::{ETAG, IF_MATCH, IF_MODIFIED_SINCE, IF_UNMODIFIED_SINCE, LAST_MODIFIED};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use keel_core::conditional::{self, ReadConditions, WriteConditions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Severity of an alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A human-readable message attached to a response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub text: String,
    pub level: AlertLevel,
}

impl Alert {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: AlertLevel::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: AlertLevel::Error,
        }
    }
}

/// Standard response envelope: `{"response": ..., "alerts": [...]}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<Alert>,
}

impl<T> Envelope<T> {
    pub fn new(response: T) -> Self {
        Self {
            response: Some(response),
            alerts: Vec::new(),
        }
    }

    /// Wrap a response with a success alert.
    pub fn with_success(response: T, text: impl Into<String>) -> Self {
        Self {
            response: Some(response),
            alerts: vec![Alert::success(text)],
        }
    }
}

/// A request body that may hold a single object or an array of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

/// Read and decode a JSON request body of at most `limit` bytes.
pub async fn read_json<T: DeserializeOwned>(req: Request, limit: usize) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// Parse a numeric resource ID from a path or query segment.
pub fn parse_id(what: &str, raw: &str) -> ApiResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::BadRequest(format!(
            "{what} must be a positive integer"
        ))),
    }
}

/// Parse an optional numeric query filter.
pub fn parse_optional_id(what: &str, raw: Option<&str>) -> ApiResult<Option<i64>> {
    raw.map(|r| parse_id(what, r)).transpose()
}

/// Format a timestamp for JSON responses.
pub fn format_timestamp(t: OffsetDateTime) -> ApiResult<String> {
    t.format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Conditions a read request carries.
pub fn read_conditions(headers: &HeaderMap) -> ReadConditions {
    ReadConditions::from_headers(header_str(headers, &IF_MODIFIED_SINCE))
}

/// Conditions a write request carries.
pub fn write_conditions(headers: &HeaderMap) -> WriteConditions {
    WriteConditions::from_headers(
        header_str(headers, &IF_UNMODIFIED_SINCE),
        header_str(headers, &IF_MATCH),
    )
}

/// `ETag` and `Last-Modified` headers for a resource.
pub fn validator_headers(last_modified: OffsetDateTime) -> ApiResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let etag = HeaderValue::from_str(&conditional::etag(last_modified))
        .map_err(|e| ApiError::Internal(format!("invalid etag: {e}")))?;
    let date = HeaderValue::from_str(&conditional::format_http_date(last_modified))
        .map_err(|e| ApiError::Internal(format!("invalid last-modified: {e}")))?;
    headers.insert(ETAG, etag);
    headers.insert(LAST_MODIFIED, date);
    Ok(headers)
}

/// Empty 304 response.
pub fn not_modified() -> Response {
    metrics::NOT_MODIFIED_RESPONSES.inc();
    StatusCode::NOT_MODIFIED.into_response()
}
