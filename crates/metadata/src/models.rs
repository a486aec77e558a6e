//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// CDNs and locks
// =============================================================================

/// CDN record. Profiles are scoped to exactly one CDN.
#[derive(Debug, Clone, FromRow)]
pub struct CdnRow {
    pub id: i64,
    pub name: String,
    pub domain_name: String,
    pub dnssec_enabled: bool,
    pub last_updated: OffsetDateTime,
}

/// Lock held on a CDN by a user. At most one per CDN.
#[derive(Debug, Clone, FromRow)]
pub struct CdnLockRow {
    /// CDN name.
    pub cdn: String,
    pub username: String,
    pub message: Option<String>,
    /// Soft locks are advisory and never block mutations.
    pub soft: bool,
    pub last_updated: OffsetDateTime,
}

// =============================================================================
// Profiles and parameters
// =============================================================================

/// Profile record, joined with its CDN name.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub profile_type: String,
    pub cdn: i64,
    pub cdn_name: String,
    pub routing_disabled: bool,
    pub last_updated: OffsetDateTime,
}

/// Parameter record. Unique on (name, config_file, value).
#[derive(Debug, Clone, FromRow)]
pub struct ParameterRow {
    pub id: i64,
    pub name: String,
    pub config_file: String,
    pub value: String,
    pub secure: bool,
    pub last_updated: OffsetDateTime,
}

/// Association between a profile and a parameter.
#[derive(Debug, Clone, FromRow)]
pub struct ProfileParameterRow {
    pub profile: i64,
    pub parameter: i64,
    pub last_updated: OffsetDateTime,
}

/// New parameter input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParameter {
    pub name: String,
    pub config_file: String,
    pub value: String,
    pub secure: bool,
}

/// A profile with its parameters, in portable form.
#[derive(Debug, Clone)]
pub struct ProfileExport {
    pub profile: ProfileRow,
    /// Ordered by (config_file, name, value).
    pub parameters: Vec<ParameterRow>,
}

/// Input for importing a profile.
#[derive(Debug, Clone)]
pub struct ProfileImport {
    pub name: String,
    pub description: String,
    /// CDN name, resolved at import time.
    pub cdn_name: String,
    pub profile_type: String,
    pub routing_disabled: bool,
    /// Existing parameters are matched on (name, config_file, value);
    /// `secure` only applies to parameters the import creates.
    pub parameters: Vec<NewParameter>,
}

/// Result of a profile copy.
#[derive(Debug, Clone)]
pub struct CopiedProfile {
    pub created: ProfileRow,
    pub source: ProfileRow,
}

/// Profile list filters. All present filters must match.
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub cdn: Option<i64>,
    /// Profiles associated with any of these parameter IDs.
    pub parameters: Vec<i64>,
}

/// Parameter list filters.
#[derive(Debug, Clone, Default)]
pub struct ParameterFilter {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub config_file: Option<String>,
    pub value: Option<String>,
}

// =============================================================================
// Tokens
// =============================================================================

/// Token record.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub token_hash: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}
