//! Bootstrap admin token repository.

use crate::error::MetadataResult;
use crate::models::TokenRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository tracking which token was created from the configured admin hash.
#[async_trait]
pub trait BootstrapRepo: Send + Sync {
    /// Get the active bootstrap token ID, if set.
    async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>>;

    /// Point the bootstrap marker at an existing token.
    async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()>;

    /// Install a new bootstrap token in one transaction: revoke the previous
    /// bootstrap token (if any), insert `token`, and move the marker.
    ///
    /// Returns the ID of the revoked token.
    async fn rotate_bootstrap_token(
        &self,
        token: &TokenRow,
        now: OffsetDateTime,
    ) -> MetadataResult<Option<Uuid>>;
}
