//! Parameter and profile-parameter repository.

use crate::error::MetadataResult;
use crate::models::{NewParameter, ParameterFilter, ParameterRow, ProfileParameterRow};
use async_trait::async_trait;

/// Repository for parameter operations.
#[async_trait]
pub trait ParameterRepo: Send + Sync {
    /// Create a parameter. Fails with `AlreadyExists` when the
    /// (name, config_file, value) triple is taken.
    async fn create_parameter(&self, parameter: &NewParameter) -> MetadataResult<ParameterRow>;

    /// Get a parameter by ID.
    async fn get_parameter(&self, id: i64) -> MetadataResult<Option<ParameterRow>>;

    /// List parameters matching `filter`, ordered by ID.
    async fn list_parameters(&self, filter: &ParameterFilter) -> MetadataResult<Vec<ParameterRow>>;

    /// Delete a parameter and its associations.
    ///
    /// Fails with `Locked` when any profile using it sits on a CDN hard-locked
    /// by someone other than `requester`.
    async fn delete_parameter(&self, id: i64, requester: &str) -> MetadataResult<ParameterRow>;

    /// Associate parameters with profiles, all or nothing.
    async fn associate_parameters(
        &self,
        pairs: &[(i64, i64)],
        requester: &str,
    ) -> MetadataResult<Vec<ProfileParameterRow>>;
}
