//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{CdnLockRow, ProfileRow};
use crate::repos::{BootstrapRepo, CdnRepo, LockRepo, ParameterRepo, ProfileRepo, TokenRepo};
use async_trait::async_trait;
use keel_core::{Outcome, WriteConditions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    CdnRepo + LockRepo + ProfileRepo + ParameterRepo + TokenRepo + BootstrapRepo + Send + Sync
{
    /// Create the schema if it does not exist.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema as needed.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout = Duration::from_secs(query_timeout_secs.unwrap_or(30));

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // A single connection serializes writers, so lock checks and the
        // writes they guard never interleave across requests.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout,
        };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Log operations that ran longer than the configured query timeout.
    /// SQLite cannot cancel a running statement, so this is advisory.
    fn observe(&self, operation: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_secs = self.query_timeout.as_secs(),
                "Slow metadata operation"
            );
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Profile columns joined with the owning CDN's name.
const PROFILE_SELECT: &str = r#"
    SELECT p.id, p.name, p.description, p.type AS profile_type, p.cdn,
           c.name AS cdn_name, p.routing_disabled, p.last_updated
    FROM profiles p
    JOIN cdns c ON c.id = p.cdn
"#;

fn order_column(order_by: keel_core::OrderBy) -> &'static str {
    use keel_core::OrderBy;
    match order_by {
        OrderBy::Id => "p.id",
        OrderBy::Name => "p.name",
        OrderBy::Description => "p.description",
        OrderBy::Type => "p.type",
        OrderBy::Cdn => "p.cdn",
        OrderBy::CdnName => "c.name",
        OrderBy::RoutingDisabled => "p.routing_disabled",
        OrderBy::LastUpdated => "p.last_updated",
    }
}

/// Map a unique-constraint failure to `AlreadyExists`, passing other errors through.
fn unique_violation(err: sqlx::Error, what: impl FnOnce() -> String) -> MetadataError {
    match err {
        sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint") => {
            MetadataError::AlreadyExists(what())
        }
        other => other.into(),
    }
}

// =============================================================================
// Transaction-scoped checks
// =============================================================================

async fn fetch_profile(conn: &mut SqliteConnection, id: i64) -> MetadataResult<Option<ProfileRow>> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!("{PROFILE_SELECT} WHERE p.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

async fn fetch_profile_by_name(
    conn: &mut SqliteConnection,
    name: &str,
) -> MetadataResult<Option<ProfileRow>> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!("{PROFILE_SELECT} WHERE p.name = ?"))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

async fn require_profile(conn: &mut SqliteConnection, id: i64) -> MetadataResult<ProfileRow> {
    fetch_profile(conn, id)
        .await?
        .ok_or_else(|| MetadataError::NotFound(format!("profile {id} not found")))
}

/// A referenced CDN that does not exist is a validation failure.
async fn require_cdn(conn: &mut SqliteConnection, cdn_id: i64) -> MetadataResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cdns WHERE id = ?)")
        .bind(cdn_id)
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(MetadataError::Invalid(format!("cdn {cdn_id} does not exist")))
    }
}

/// Fail with `Locked` when another user holds a hard lock on the CDN.
async fn ensure_unlocked(
    conn: &mut SqliteConnection,
    cdn_id: i64,
    requester: &str,
) -> MetadataResult<()> {
    let lock = sqlx::query_as::<_, CdnLockRow>(
        r#"
        SELECT l.* FROM cdn_locks l
        JOIN cdns c ON c.name = l.cdn
        WHERE c.id = ?
        "#,
    )
    .bind(cdn_id)
    .fetch_optional(&mut *conn)
    .await?;

    match lock {
        Some(lock) if !lock.soft && lock.username != requester => {
            tracing::debug!(cdn = %lock.cdn, owner = %lock.username, requester, "Mutation blocked by CDN lock");
            Err(MetadataError::Locked {
                cdn: lock.cdn,
                owner: lock.username,
            })
        }
        _ => Ok(()),
    }
}

fn check_preconditions(conditions: &WriteConditions, profile: &ProfileRow) -> MetadataResult<()> {
    match conditions.evaluate(profile.last_updated) {
        Outcome::PreconditionFailed => Err(MetadataError::PreconditionFailed(format!(
            "profile {} has been modified",
            profile.id
        ))),
        _ => Ok(()),
    }
}

async fn ensure_name_free(
    conn: &mut SqliteConnection,
    name: &str,
    except_id: Option<i64>,
) -> MetadataResult<()> {
    match fetch_profile_by_name(conn, name).await? {
        Some(existing) if Some(existing.id) != except_id => Err(MetadataError::AlreadyExists(
            format!("profile with name {name} already exists"),
        )),
        _ => Ok(()),
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use keel_core::profile::{validate_parameter, validate_profile_name};
    use keel_core::{ListQuery, ProfileDraft, ProfileType};
    use time::OffsetDateTime;
    use uuid::Uuid;

    // =========================================================================
    // CDNs
    // =========================================================================

    #[async_trait]
    impl CdnRepo for SqliteStore {
        async fn create_cdn(
            &self,
            name: &str,
            domain_name: &str,
            dnssec_enabled: bool,
        ) -> MetadataResult<CdnRow> {
            let result = sqlx::query(
                "INSERT INTO cdns (name, domain_name, dnssec_enabled, last_updated) VALUES (?, ?, ?, ?)",
            )
            .bind(name)
            .bind(domain_name)
            .bind(dnssec_enabled)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, || format!("cdn with name {name} already exists")))?;

            self.get_cdn(result.last_insert_rowid())
                .await?
                .ok_or_else(|| MetadataError::Internal("created cdn vanished".to_string()))
        }

        async fn get_cdn(&self, id: i64) -> MetadataResult<Option<CdnRow>> {
            let row = sqlx::query_as::<_, CdnRow>("SELECT * FROM cdns WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_cdn_by_name(&self, name: &str) -> MetadataResult<Option<CdnRow>> {
            let row = sqlx::query_as::<_, CdnRow>("SELECT * FROM cdns WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_cdns(&self) -> MetadataResult<Vec<CdnRow>> {
            let rows = sqlx::query_as::<_, CdnRow>("SELECT * FROM cdns ORDER BY name, id")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    // =========================================================================
    // Locks
    // =========================================================================

    #[async_trait]
    impl LockRepo for SqliteStore {
        async fn acquire_lock(
            &self,
            cdn: &str,
            username: &str,
            soft: bool,
            message: Option<&str>,
        ) -> MetadataResult<CdnLockRow> {
            let mut tx = self.pool.begin().await?;

            let cdn_exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM cdns WHERE name = ?)")
                    .bind(cdn)
                    .fetch_one(&mut *tx)
                    .await?;
            if !cdn_exists {
                return Err(MetadataError::NotFound(format!("cdn {cdn} not found")));
            }

            // Compare-and-swap: the conflicting row is only replaced when it is
            // soft or already ours.
            let result = sqlx::query(
                r#"
                INSERT INTO cdn_locks (cdn, username, message, soft, last_updated)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(cdn) DO UPDATE SET
                    username = excluded.username,
                    message = excluded.message,
                    soft = excluded.soft,
                    last_updated = excluded.last_updated
                WHERE cdn_locks.soft = 1 OR cdn_locks.username = excluded.username
                "#,
            )
            .bind(cdn)
            .bind(username)
            .bind(message)
            .bind(soft)
            .bind(OffsetDateTime::now_utc())
            .execute(&mut *tx)
            .await?;

            let lock = sqlx::query_as::<_, CdnLockRow>("SELECT * FROM cdn_locks WHERE cdn = ?")
                .bind(cdn)
                .fetch_one(&mut *tx)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::Conflict(format!(
                    "cdn {cdn} is already hard-locked by {}",
                    lock.username
                )));
            }

            tx.commit().await?;
            Ok(lock)
        }

        async fn release_lock(
            &self,
            cdn: &str,
            username: &str,
            is_admin: bool,
        ) -> MetadataResult<CdnLockRow> {
            let mut tx = self.pool.begin().await?;

            let lock = sqlx::query_as::<_, CdnLockRow>("SELECT * FROM cdn_locks WHERE cdn = ?")
                .bind(cdn)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("no lock on cdn {cdn}")))?;

            if lock.username != username && !is_admin {
                return Err(MetadataError::Forbidden(format!(
                    "lock on cdn {cdn} is held by {}",
                    lock.username
                )));
            }

            sqlx::query("DELETE FROM cdn_locks WHERE cdn = ?")
                .bind(cdn)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(lock)
        }

        async fn list_locks(
            &self,
            cdn: Option<&str>,
            username: Option<&str>,
        ) -> MetadataResult<Vec<CdnLockRow>> {
            let rows = sqlx::query_as::<_, CdnLockRow>(
                r#"
                SELECT * FROM cdn_locks
                WHERE (?1 IS NULL OR cdn = ?1)
                  AND (?2 IS NULL OR username = ?2)
                ORDER BY cdn
                "#,
            )
            .bind(cdn)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    async fn insert_profile(
        conn: &mut SqliteConnection,
        draft: &ProfileDraft,
        profile_type: ProfileType,
        now: OffsetDateTime,
    ) -> MetadataResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (name, description, type, cdn, routing_disabled, last_updated)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(profile_type.as_str())
        .bind(draft.cdn_id)
        .bind(draft.routing_disabled)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            unique_violation(e, || {
                format!("profile with name {} already exists", draft.name)
            })
        })?;
        Ok(result.last_insert_rowid())
    }

    #[async_trait]
    impl ProfileRepo for SqliteStore {
        async fn create_profile(
            &self,
            draft: &ProfileDraft,
            requester: &str,
        ) -> MetadataResult<ProfileRow> {
            let profile_type = draft.validate()?;

            let mut tx = self.pool.begin().await?;
            require_cdn(&mut tx, draft.cdn_id).await?;
            ensure_unlocked(&mut tx, draft.cdn_id, requester).await?;
            ensure_name_free(&mut tx, &draft.name, None).await?;

            let id = insert_profile(&mut tx, draft, profile_type, OffsetDateTime::now_utc()).await?;
            let row = require_profile(&mut tx, id).await?;
            tx.commit().await?;

            tracing::info!(profile_id = id, name = %row.name, requester, "Profile created");
            Ok(row)
        }

        async fn get_profile(&self, id: i64) -> MetadataResult<Option<ProfileRow>> {
            let mut conn = self.pool.acquire().await?;
            fetch_profile(&mut conn, id).await
        }

        async fn get_profile_by_name(&self, name: &str) -> MetadataResult<Option<ProfileRow>> {
            let mut conn = self.pool.acquire().await?;
            fetch_profile_by_name(&mut conn, name).await
        }

        async fn list_profiles(
            &self,
            filter: &ProfileFilter,
            query: &ListQuery,
        ) -> MetadataResult<Vec<ProfileRow>> {
            let started = Instant::now();
            let sql = format!(
                r#"
                {PROFILE_SELECT}
                WHERE (?1 IS NULL OR p.id = ?1)
                  AND (?2 IS NULL OR p.name = ?2)
                  AND (?3 IS NULL OR p.cdn = ?3)
                  AND (?4 IS NULL OR EXISTS (
                      SELECT 1 FROM profile_parameters pp
                      WHERE pp.profile = p.id
                        AND pp.parameter IN (SELECT value FROM json_each(?4))
                  ))
                ORDER BY {} {}, p.id ASC
                LIMIT ?5 OFFSET ?6
                "#,
                order_column(query.order_by),
                query.sort_order.as_sql(),
            );

            let parameters = (!filter.parameters.is_empty()).then(|| {
                let ids: Vec<String> = filter.parameters.iter().map(i64::to_string).collect();
                format!("[{}]", ids.join(","))
            });
            let limit = query.window.limit.unwrap_or(-1);

            let rows = sqlx::query_as::<_, ProfileRow>(&sql)
                .bind(filter.id)
                .bind(filter.name.as_deref())
                .bind(filter.cdn)
                .bind(parameters)
                .bind(limit)
                .bind(query.window.offset)
                .fetch_all(&self.pool)
                .await?;

            self.observe("list_profiles", started);
            Ok(rows)
        }

        async fn update_profile(
            &self,
            id: i64,
            draft: &ProfileDraft,
            requester: &str,
            conditions: &WriteConditions,
        ) -> MetadataResult<ProfileRow> {
            let profile_type = draft.validate()?;

            let mut tx = self.pool.begin().await?;
            require_cdn(&mut tx, draft.cdn_id).await?;
            let current = require_profile(&mut tx, id).await?;
            check_preconditions(conditions, &current)?;
            ensure_unlocked(&mut tx, current.cdn, requester).await?;
            if draft.cdn_id != current.cdn {
                ensure_unlocked(&mut tx, draft.cdn_id, requester).await?;
            }
            ensure_name_free(&mut tx, &draft.name, Some(id)).await?;

            sqlx::query(
                r#"
                UPDATE profiles
                SET name = ?, description = ?, type = ?, cdn = ?, routing_disabled = ?, last_updated = ?
                WHERE id = ?
                "#,
            )
            .bind(&draft.name)
            .bind(&draft.description)
            .bind(profile_type.as_str())
            .bind(draft.cdn_id)
            .bind(draft.routing_disabled)
            .bind(OffsetDateTime::now_utc())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                unique_violation(e, || {
                    format!("profile with name {} already exists", draft.name)
                })
            })?;

            let row = require_profile(&mut tx, id).await?;
            tx.commit().await?;

            tracing::info!(profile_id = id, requester, "Profile updated");
            Ok(row)
        }

        async fn delete_profile(
            &self,
            id: i64,
            requester: &str,
            conditions: &WriteConditions,
        ) -> MetadataResult<ProfileRow> {
            let mut tx = self.pool.begin().await?;
            let current = require_profile(&mut tx, id).await?;
            check_preconditions(conditions, &current)?;
            ensure_unlocked(&mut tx, current.cdn, requester).await?;

            sqlx::query("DELETE FROM profiles WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(profile_id = id, name = %current.name, requester, "Profile deleted");
            Ok(current)
        }

        async fn get_profile_parameters(
            &self,
            profile_id: i64,
        ) -> MetadataResult<Vec<ParameterRow>> {
            let rows = sqlx::query_as::<_, ParameterRow>(
                r#"
                SELECT pa.* FROM parameters pa
                JOIN profile_parameters pp ON pp.parameter = pa.id
                WHERE pp.profile = ?
                ORDER BY pa.id
                "#,
            )
            .bind(profile_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn copy_profile(
            &self,
            existing_name: &str,
            new_name: &str,
            requester: &str,
        ) -> MetadataResult<CopiedProfile> {
            validate_profile_name(new_name)?;

            let mut tx = self.pool.begin().await?;
            let source = fetch_profile_by_name(&mut tx, existing_name)
                .await?
                .ok_or_else(|| {
                    MetadataError::NotFound(format!(
                        "profile with name {existing_name} does not exist"
                    ))
                })?;
            if fetch_profile_by_name(&mut tx, new_name).await?.is_some() {
                return Err(MetadataError::Invalid(format!(
                    "profile with name {new_name} already exists"
                )));
            }
            ensure_unlocked(&mut tx, source.cdn, requester).await?;

            let profile_type = ProfileType::parse(&source.profile_type)?;
            let draft = ProfileDraft {
                name: new_name.to_string(),
                description: source.description.clone(),
                profile_type: source.profile_type.clone(),
                cdn_id: source.cdn,
                routing_disabled: source.routing_disabled,
            };
            let now = OffsetDateTime::now_utc();
            let id = insert_profile(&mut tx, &draft, profile_type, now).await?;

            let copied = sqlx::query(
                r#"
                INSERT INTO profile_parameters (profile, parameter, last_updated)
                SELECT ?, parameter, ? FROM profile_parameters WHERE profile = ?
                "#,
            )
            .bind(id)
            .bind(now)
            .bind(source.id)
            .execute(&mut *tx)
            .await?;

            let created = require_profile(&mut tx, id).await?;
            tx.commit().await?;

            tracing::info!(
                profile_id = id,
                source_id = source.id,
                parameters = copied.rows_affected(),
                requester,
                "Profile copied"
            );
            Ok(CopiedProfile { created, source })
        }

        async fn export_profile(&self, id: i64) -> MetadataResult<Option<ProfileExport>> {
            let Some(profile) = self.get_profile(id).await? else {
                return Ok(None);
            };

            let parameters = sqlx::query_as::<_, ParameterRow>(
                r#"
                SELECT pa.* FROM parameters pa
                JOIN profile_parameters pp ON pp.parameter = pa.id
                WHERE pp.profile = ?
                ORDER BY pa.config_file, pa.name, pa.value
                "#,
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

            Ok(Some(ProfileExport {
                profile,
                parameters,
            }))
        }

        async fn import_profile(
            &self,
            import: &ProfileImport,
            requester: &str,
        ) -> MetadataResult<ProfileRow> {
            let started = Instant::now();
            validate_profile_name(&import.name)?;
            for p in &import.parameters {
                validate_parameter(&p.name, &p.config_file)?;
            }

            let mut tx = self.pool.begin().await?;
            if fetch_profile_by_name(&mut tx, &import.name).await?.is_some() {
                return Err(MetadataError::Invalid(format!(
                    "profile with name {} already exists",
                    import.name
                )));
            }
            let cdn_id: i64 = sqlx::query_scalar("SELECT id FROM cdns WHERE name = ?")
                .bind(&import.cdn_name)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    MetadataError::Invalid(format!("cdn {} does not exist", import.cdn_name))
                })?;

            let draft = ProfileDraft {
                name: import.name.clone(),
                description: import.description.clone(),
                profile_type: import.profile_type.clone(),
                cdn_id,
                routing_disabled: import.routing_disabled,
            };
            let profile_type = draft.validate()?;
            ensure_unlocked(&mut tx, cdn_id, requester).await?;

            let now = OffsetDateTime::now_utc();
            let id = insert_profile(&mut tx, &draft, profile_type, now).await?;

            let mut created_parameters = 0u64;
            for p in &import.parameters {
                let existing: Option<i64> = sqlx::query_scalar(
                    "SELECT id FROM parameters WHERE name = ? AND config_file = ? AND value = ?",
                )
                .bind(&p.name)
                .bind(&p.config_file)
                .bind(&p.value)
                .fetch_optional(&mut *tx)
                .await?;

                let parameter_id = match existing {
                    Some(parameter_id) => parameter_id,
                    None => {
                        created_parameters += 1;
                        sqlx::query(
                            r#"
                            INSERT INTO parameters (name, config_file, value, secure, last_updated)
                            VALUES (?, ?, ?, ?, ?)
                            "#,
                        )
                        .bind(&p.name)
                        .bind(&p.config_file)
                        .bind(&p.value)
                        .bind(p.secure)
                        .bind(now)
                        .execute(&mut *tx)
                        .await?
                        .last_insert_rowid()
                    }
                };

                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO profile_parameters (profile, parameter, last_updated)
                    VALUES (?, ?, ?)
                    "#,
                )
                .bind(id)
                .bind(parameter_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            let row = require_profile(&mut tx, id).await?;
            tx.commit().await?;

            self.observe("import_profile", started);
            tracing::info!(
                profile_id = id,
                parameters = import.parameters.len(),
                created_parameters,
                requester,
                "Profile imported"
            );
            Ok(row)
        }
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    #[async_trait]
    impl ParameterRepo for SqliteStore {
        async fn create_parameter(&self, parameter: &NewParameter) -> MetadataResult<ParameterRow> {
            validate_parameter(&parameter.name, &parameter.config_file)?;

            let result = sqlx::query(
                r#"
                INSERT INTO parameters (name, config_file, value, secure, last_updated)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&parameter.name)
            .bind(&parameter.config_file)
            .bind(&parameter.value)
            .bind(parameter.secure)
            .bind(OffsetDateTime::now_utc())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                unique_violation(e, || {
                    format!(
                        "parameter with name {}, config file {} and value {} already exists",
                        parameter.name, parameter.config_file, parameter.value
                    )
                })
            })?;

            self.get_parameter(result.last_insert_rowid())
                .await?
                .ok_or_else(|| MetadataError::Internal("created parameter vanished".to_string()))
        }

        async fn get_parameter(&self, id: i64) -> MetadataResult<Option<ParameterRow>> {
            let row = sqlx::query_as::<_, ParameterRow>("SELECT * FROM parameters WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_parameters(
            &self,
            filter: &ParameterFilter,
        ) -> MetadataResult<Vec<ParameterRow>> {
            let rows = sqlx::query_as::<_, ParameterRow>(
                r#"
                SELECT * FROM parameters
                WHERE (?1 IS NULL OR id = ?1)
                  AND (?2 IS NULL OR name = ?2)
                  AND (?3 IS NULL OR config_file = ?3)
                  AND (?4 IS NULL OR value = ?4)
                ORDER BY id
                "#,
            )
            .bind(filter.id)
            .bind(filter.name.as_deref())
            .bind(filter.config_file.as_deref())
            .bind(filter.value.as_deref())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_parameter(&self, id: i64, requester: &str) -> MetadataResult<ParameterRow> {
            let mut tx = self.pool.begin().await?;

            let parameter =
                sqlx::query_as::<_, ParameterRow>("SELECT * FROM parameters WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| MetadataError::NotFound(format!("parameter {id} not found")))?;

            let blocking = sqlx::query_as::<_, CdnLockRow>(
                r#"
                SELECT DISTINCT l.* FROM cdn_locks l
                JOIN cdns c ON c.name = l.cdn
                JOIN profiles p ON p.cdn = c.id
                JOIN profile_parameters pp ON pp.profile = p.id
                WHERE pp.parameter = ? AND l.soft = 0 AND l.username <> ?
                ORDER BY l.cdn
                LIMIT 1
                "#,
            )
            .bind(id)
            .bind(requester)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(lock) = blocking {
                return Err(MetadataError::Locked {
                    cdn: lock.cdn,
                    owner: lock.username,
                });
            }

            sqlx::query("DELETE FROM parameters WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::info!(parameter_id = id, requester, "Parameter deleted");
            Ok(parameter)
        }

        async fn associate_parameters(
            &self,
            pairs: &[(i64, i64)],
            requester: &str,
        ) -> MetadataResult<Vec<ProfileParameterRow>> {
            if pairs.is_empty() {
                return Err(MetadataError::Invalid(
                    "at least one profile-parameter pair is required".to_string(),
                ));
            }

            let mut tx = self.pool.begin().await?;
            let now = OffsetDateTime::now_utc();
            let mut rows = Vec::with_capacity(pairs.len());

            for &(profile_id, parameter_id) in pairs {
                let profile = require_profile(&mut tx, profile_id).await?;
                let parameter_exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM parameters WHERE id = ?)")
                        .bind(parameter_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if !parameter_exists {
                    return Err(MetadataError::NotFound(format!(
                        "parameter {parameter_id} not found"
                    )));
                }
                ensure_unlocked(&mut tx, profile.cdn, requester).await?;

                sqlx::query(
                    "INSERT INTO profile_parameters (profile, parameter, last_updated) VALUES (?, ?, ?)",
                )
                .bind(profile_id)
                .bind(parameter_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| match unique_violation(e, String::new) {
                    MetadataError::AlreadyExists(_) => MetadataError::Conflict(format!(
                        "parameter {parameter_id} is already associated with profile {profile_id}"
                    )),
                    other => other,
                })?;

                rows.push(ProfileParameterRow {
                    profile: profile_id,
                    parameter: parameter_id,
                    last_updated: now,
                });
            }

            tx.commit().await?;
            Ok(rows)
        }
    }

    // =========================================================================
    // Tokens
    // =========================================================================

    #[async_trait]
    impl TokenRepo for SqliteStore {
        async fn create_token(&self, token: &TokenRow) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, token_hash, username, role, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(&token.token_hash)
            .bind(&token.username)
            .bind(&token.role)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_violation(e, || "token hash already registered".to_string()))?;
            Ok(())
        }

        async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_hash = ?")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>> {
            let row = sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()> {
            sqlx::query("UPDATE tokens SET last_used_at = ? WHERE token_id = ?")
                .bind(used_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }

        async fn revoke_token(
            &self,
            token_id: Uuid,
            revoked_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE tokens SET revoked_at = ? WHERE token_id = ?")
                .bind(revoked_at)
                .bind(token_id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("token {token_id} not found")));
            }
            Ok(())
        }

        async fn list_tokens(&self) -> MetadataResult<Vec<TokenRow>> {
            let rows =
                sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?;
            Ok(rows)
        }
    }

    // =========================================================================
    // Bootstrap marker
    // =========================================================================

    fn parse_marker(value: Option<String>) -> MetadataResult<Option<Uuid>> {
        value
            .filter(|id| !id.is_empty())
            .map(|id| {
                Uuid::parse_str(&id).map_err(|e| {
                    MetadataError::Internal(format!("invalid bootstrap_token_id uuid '{id}': {e}"))
                })
            })
            .transpose()
    }

    #[async_trait]
    impl BootstrapRepo for SqliteStore {
        async fn get_bootstrap_token_id(&self) -> MetadataResult<Option<Uuid>> {
            let value: Option<String> =
                sqlx::query_scalar::<_, Option<String>>(
                    "SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1",
                )
                    .fetch_optional(&self.pool)
                    .await?
                    .flatten();
            parse_marker(value)
        }

        async fn set_bootstrap_token_id(&self, token_id: Uuid) -> MetadataResult<()> {
            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token_id.to_string())
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn rotate_bootstrap_token(
            &self,
            token: &TokenRow,
            now: OffsetDateTime,
        ) -> MetadataResult<Option<Uuid>> {
            let mut tx = self.pool.begin().await?;

            let value: Option<String> =
                sqlx::query_scalar::<_, Option<String>>(
                    "SELECT bootstrap_token_id FROM bootstrap_state WHERE id = 1",
                )
                    .fetch_optional(&mut *tx)
                    .await?
                    .flatten();
            let previous = parse_marker(value)?;

            if let Some(prev_id) = previous {
                sqlx::query(
                    "UPDATE tokens SET revoked_at = ? WHERE token_id = ? AND revoked_at IS NULL",
                )
                .bind(now)
                .bind(prev_id)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                r#"
                INSERT INTO tokens (
                    token_id, token_hash, username, role, expires_at,
                    revoked_at, created_at, last_used_at, description
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(token.token_id)
            .bind(&token.token_hash)
            .bind(&token.username)
            .bind(&token.role)
            .bind(token.expires_at)
            .bind(token.revoked_at)
            .bind(token.created_at)
            .bind(token.last_used_at)
            .bind(&token.description)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO bootstrap_state (id, bootstrap_token_id)
                VALUES (1, ?)
                ON CONFLICT(id) DO UPDATE
                SET bootstrap_token_id = excluded.bootstrap_token_id
                "#,
            )
            .bind(token.token_id.to_string())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(previous)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cdns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    domain_name TEXT NOT NULL,
    dnssec_enabled INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS profiles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    type TEXT NOT NULL,
    cdn INTEGER NOT NULL REFERENCES cdns(id),
    routing_disabled INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_profiles_cdn ON profiles(cdn);

CREATE TABLE IF NOT EXISTS parameters (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    config_file TEXT NOT NULL,
    value TEXT NOT NULL,
    secure INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL,
    UNIQUE(name, config_file, value)
);

-- Associations follow both sides: deleting a profile or a parameter drops its links.
CREATE TABLE IF NOT EXISTS profile_parameters (
    profile INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
    parameter INTEGER NOT NULL REFERENCES parameters(id) ON DELETE CASCADE,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (profile, parameter)
);
CREATE INDEX IF NOT EXISTS idx_profile_parameters_parameter ON profile_parameters(parameter);

CREATE TABLE IF NOT EXISTS cdn_locks (
    cdn TEXT PRIMARY KEY REFERENCES cdns(name) ON DELETE CASCADE,
    username TEXT NOT NULL,
    message TEXT,
    soft INTEGER NOT NULL DEFAULT 1,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cdn_locks_username ON cdn_locks(username);

CREATE TABLE IF NOT EXISTS tokens (
    token_id BLOB PRIMARY KEY,
    token_hash TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    role TEXT NOT NULL,
    expires_at TEXT,
    revoked_at TEXT,
    created_at TEXT NOT NULL,
    last_used_at TEXT,
    description TEXT
);

-- Bootstrap marker
CREATE TABLE IF NOT EXISTS bootstrap_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    bootstrap_token_id TEXT
);
INSERT OR IGNORE INTO bootstrap_state (id, bootstrap_token_id) VALUES (1, NULL);
"#;
