//! CDN lock repository.

use crate::error::MetadataResult;
use crate::models::CdnLockRow;
use async_trait::async_trait;

/// Repository for CDN lock operations.
///
/// Hard locks block every profile mutation on the CDN by users other than the
/// owner. Soft locks are informational.
#[async_trait]
pub trait LockRepo: Send + Sync {
    /// Acquire (or replace) the lock on a CDN.
    ///
    /// Fails with `Conflict` when another user holds a hard lock and with
    /// `NotFound` when the CDN does not exist.
    async fn acquire_lock(
        &self,
        cdn: &str,
        username: &str,
        soft: bool,
        message: Option<&str>,
    ) -> MetadataResult<CdnLockRow>;

    /// Release the lock on a CDN. Only the owner may release unless `is_admin`.
    async fn release_lock(
        &self,
        cdn: &str,
        username: &str,
        is_admin: bool,
    ) -> MetadataResult<CdnLockRow>;

    /// List locks, optionally filtered by CDN name and owner.
    async fn list_locks(
        &self,
        cdn: Option<&str>,
        username: Option<&str>,
    ) -> MetadataResult<Vec<CdnLockRow>>;
}
