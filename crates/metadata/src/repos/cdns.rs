//! CDN repository.

use crate::error::MetadataResult;
use crate::models::CdnRow;
use async_trait::async_trait;

/// Repository for CDN operations.
#[async_trait]
pub trait CdnRepo: Send + Sync {
    /// Create a CDN. Fails with `AlreadyExists` on a duplicate name.
    async fn create_cdn(
        &self,
        name: &str,
        domain_name: &str,
        dnssec_enabled: bool,
    ) -> MetadataResult<CdnRow>;

    /// Get a CDN by ID.
    async fn get_cdn(&self, id: i64) -> MetadataResult<Option<CdnRow>>;

    /// Get a CDN by name.
    async fn get_cdn_by_name(&self, name: &str) -> MetadataResult<Option<CdnRow>>;

    /// List CDNs ordered by name.
    async fn list_cdns(&self) -> MetadataResult<Vec<CdnRow>>;
}
