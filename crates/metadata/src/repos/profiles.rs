//! Profile repository.
//!
//! Every mutation runs in a single transaction that checks, in order: input
//! that depends on stored state (CDN references), existence, request
//! preconditions, the CDN lock, and name uniqueness.

use crate::error::MetadataResult;
use crate::models::{
    CopiedProfile, ParameterRow, ProfileExport, ProfileFilter, ProfileImport, ProfileRow,
};
use async_trait::async_trait;
use keel_core::{ListQuery, ProfileDraft, WriteConditions};

/// Repository for profile operations.
#[async_trait]
pub trait ProfileRepo: Send + Sync {
    /// Create a profile on behalf of `requester`.
    async fn create_profile(&self, draft: &ProfileDraft, requester: &str)
    -> MetadataResult<ProfileRow>;

    /// Get a profile by ID.
    async fn get_profile(&self, id: i64) -> MetadataResult<Option<ProfileRow>>;

    /// Get a profile by name.
    async fn get_profile_by_name(&self, name: &str) -> MetadataResult<Option<ProfileRow>>;

    /// List profiles matching `filter`, ordered and windowed by `query`.
    async fn list_profiles(
        &self,
        filter: &ProfileFilter,
        query: &ListQuery,
    ) -> MetadataResult<Vec<ProfileRow>>;

    /// Replace every field of a profile.
    async fn update_profile(
        &self,
        id: i64,
        draft: &ProfileDraft,
        requester: &str,
        conditions: &WriteConditions,
    ) -> MetadataResult<ProfileRow>;

    /// Delete a profile. Associations are removed with it.
    async fn delete_profile(
        &self,
        id: i64,
        requester: &str,
        conditions: &WriteConditions,
    ) -> MetadataResult<ProfileRow>;

    /// Parameters associated with a profile, ordered by ID.
    async fn get_profile_parameters(&self, profile_id: i64) -> MetadataResult<Vec<ParameterRow>>;

    /// Copy a profile and all its associations under a new name.
    async fn copy_profile(
        &self,
        existing_name: &str,
        new_name: &str,
        requester: &str,
    ) -> MetadataResult<CopiedProfile>;

    /// Export a profile with its parameters.
    async fn export_profile(&self, id: i64) -> MetadataResult<Option<ProfileExport>>;

    /// Import a profile, creating missing parameters and associating them.
    async fn import_profile(
        &self,
        import: &ProfileImport,
        requester: &str,
    ) -> MetadataResult<ProfileRow>;
}
