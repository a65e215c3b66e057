//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{AccessPolicyRepo, AllowlistRepo, ObjectRepo};
use crate::store::{IsolationLevel, MetadataStore};
use async_trait::async_trait;
use futures::future::BoxFuture;
use lfs_core::config::PgSslMode;
use lfs_core::{HashAlgo, Oid, RepositoryName};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres, Transaction};
use std::path::Path;
use std::str::FromStr;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

fn sqlx_ssl_mode(mode: PgSslMode) -> SqlxPgSslMode {
    match mode {
        PgSslMode::Disable => SqlxPgSslMode::Disable,
        PgSslMode::Prefer => SqlxPgSslMode::Prefer,
        PgSslMode::Require => SqlxPgSslMode::Require,
        PgSslMode::VerifyCa => SqlxPgSslMode::VerifyCa,
        PgSslMode::VerifyFull => SqlxPgSslMode::VerifyFull,
    }
}

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        tracing::info!(
            host = opts.get_host(),
            port = opts.get_port(),
            database = opts.get_database().unwrap_or("<default>"),
            "Connecting to PostgreSQL from URL"
        );
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    ///
    /// This allows credentials to be passed separately, enabling better
    /// secret management (e.g., passwords via environment variables).
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
        ssl_root_cert: Option<&Path>,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let mut opts = PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database);

        if let Some(user) = username {
            opts = opts.username(user);
        }

        if let Some(pass) = password {
            opts = opts.password(pass);
        }

        if let Some(mode) = ssl_mode {
            opts = opts.ssl_mode(sqlx_ssl_mode(mode));
        }

        if let Some(cert) = ssl_root_cert {
            opts = opts.ssl_root_cert(cert);
        }

        // Log connection info without password
        tracing::info!(
            host = host,
            port = port,
            database = database,
            username = username.unwrap_or("<none>"),
            ssl_mode = ?ssl_mode,
            "Connecting to PostgreSQL with individual parameters"
        );

        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Run `f` inside a transaction at the given isolation level.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. If
    /// `f` panics the transaction is dropped unfinished, which sqlx rolls
    /// back when the connection returns to the pool.
    pub async fn with_transaction<T, F>(&self, isolation: IsolationLevel, f: F) -> MetadataResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(
                &'c mut Transaction<'static, Postgres>,
            ) -> BoxFuture<'c, MetadataResult<T>>
            + Send,
    {
        let mut tx = self.pool.begin().await?;
        if let Some(statement) = isolation.set_statement() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement,
        // so we split the schema and execute each statement separately.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn prepare_upload(
        &self,
        oid: &Oid,
        size: i64,
        algo: HashAlgo,
        repo: &RepositoryName,
    ) -> MetadataResult<LfsObjectRow> {
        let pending = LfsObjectRow::pending(oid, size, algo);
        let repository = repo.full_name();

        self.with_transaction(IsolationLevel::ReadCommitted, move |tx| {
            Box::pin(async move {
                // A pending row follows the latest requested size; an uploaded
                // row is immutable, so the conditional update returns nothing.
                let upserted = sqlx::query_as::<_, LfsObjectRow>(
                    r#"
                    INSERT INTO lfs_objects
                        (oid, size, hash_algo, storage_key, uploaded, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, FALSE, $5, $5)
                    ON CONFLICT (oid) DO UPDATE
                    SET size = EXCLUDED.size, updated_at = EXCLUDED.updated_at
                    WHERE lfs_objects.uploaded = FALSE
                    RETURNING *
                    "#,
                )
                .bind(&pending.oid)
                .bind(pending.size)
                .bind(&pending.hash_algo)
                .bind(&pending.storage_key)
                .bind(pending.created_at)
                .fetch_optional(&mut **tx)
                .await?;

                let row = match upserted {
                    Some(row) => row,
                    None => {
                        sqlx::query_as::<_, LfsObjectRow>(
                            "SELECT * FROM lfs_objects WHERE oid = $1",
                        )
                        .bind(&pending.oid)
                        .fetch_one(&mut **tx)
                        .await?
                    }
                };

                sqlx::query(
                    r#"
                    INSERT INTO lfs_object_access_policies (lfs_object_oid, repository, created_at)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (lfs_object_oid) DO UPDATE
                    SET repository = EXCLUDED.repository
                    "#,
                )
                .bind(&pending.oid)
                .bind(&repository)
                .bind(OffsetDateTime::now_utc())
                .execute(&mut **tx)
                .await?;

                Ok(row)
            })
        })
        .await
    }
}

#[async_trait]
impl ObjectRepo for PostgresStore {
    async fn find_object(&self, oid: &Oid) -> MetadataResult<Option<LfsObjectRow>> {
        let row = sqlx::query_as::<_, LfsObjectRow>("SELECT * FROM lfs_objects WHERE oid = $1")
            .bind(oid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_object(&self, row: &LfsObjectRow) -> MetadataResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO lfs_objects
                (oid, size, hash_algo, storage_key, uploaded, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (oid) DO NOTHING
            "#,
        )
        .bind(&row.oid)
        .bind(row.size)
        .bind(&row.hash_algo)
        .bind(&row.storage_key)
        .bind(row.uploaded)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::AlreadyExists(format!("lfs object {}", row.oid)));
        }
        Ok(())
    }

    async fn update_object(&self, row: &LfsObjectRow) -> MetadataResult<()> {
        let row = row.clone();
        self.with_transaction(IsolationLevel::Default, move |tx| {
            Box::pin(async move {
                let existing = sqlx::query_as::<_, LfsObjectRow>(
                    "SELECT * FROM lfs_objects WHERE oid = $1 FOR UPDATE",
                )
                .bind(&row.oid)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("lfs object {}", row.oid)))?;

                if existing.uploaded {
                    if !row.uploaded {
                        return Err(MetadataError::InvalidStateTransition {
                            from: "uploaded".to_string(),
                            to: "pending".to_string(),
                        });
                    }
                    if existing.size != row.size || existing.hash_algo != row.hash_algo {
                        return Err(MetadataError::Constraint(format!(
                            "lfs object {} is uploaded and immutable",
                            row.oid
                        )));
                    }
                }

                sqlx::query(
                    "UPDATE lfs_objects SET size = $2, uploaded = $3, updated_at = $4 WHERE oid = $1",
                )
                .bind(&row.oid)
                .bind(row.size)
                .bind(row.uploaded)
                .bind(OffsetDateTime::now_utc())
                .execute(&mut **tx)
                .await?;
                Ok(())
            })
        })
        .await
    }

    async fn object_exists(&self, oid: &Oid) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM lfs_objects WHERE oid = $1)")
                .bind(oid.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn mark_uploaded(&self, oid: &Oid) -> MetadataResult<LfsObjectRow> {
        // Only touch updated_at on the actual transition.
        let row = sqlx::query_as::<_, LfsObjectRow>(
            r#"
            UPDATE lfs_objects
            SET uploaded = TRUE,
                updated_at = CASE WHEN uploaded THEN updated_at ELSE $2 END
            WHERE oid = $1
            RETURNING *
            "#,
        )
        .bind(oid.as_str())
        .bind(OffsetDateTime::now_utc())
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| MetadataError::NotFound(format!("lfs object {oid}")))
    }
}

#[async_trait]
impl AccessPolicyRepo for PostgresStore {
    async fn find_access_policy(&self, oid: &Oid) -> MetadataResult<Option<AccessPolicyRow>> {
        let row = sqlx::query_as::<_, AccessPolicyRow>(
            "SELECT * FROM lfs_object_access_policies WHERE lfs_object_oid = $1",
        )
        .bind(oid.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn save_access_policy(
        &self,
        oid: &Oid,
        repo: &RepositoryName,
    ) -> MetadataResult<AccessPolicyRow> {
        let row = sqlx::query_as::<_, AccessPolicyRow>(
            r#"
            INSERT INTO lfs_object_access_policies (lfs_object_oid, repository, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (lfs_object_oid) DO UPDATE
            SET repository = EXCLUDED.repository
            RETURNING *
            "#,
        )
        .bind(oid.as_str())
        .bind(repo.full_name())
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_access_policy(&self, oid: &Oid) -> MetadataResult<()> {
        let result =
            sqlx::query("DELETE FROM lfs_object_access_policies WHERE lfs_object_oid = $1")
                .bind(oid.as_str())
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("access policy for {oid}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AllowlistRepo for PostgresStore {
    async fn is_repository_allowed(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        let allowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM repository_allowlist WHERE repository = $1)",
        )
        .bind(repo.full_name())
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }

    async fn add_repository(&self, repo: &RepositoryName) -> MetadataResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO repository_allowlist (repository, created_at)
            VALUES ($1, $2)
            ON CONFLICT (repository) DO NOTHING
            "#,
        )
        .bind(repo.full_name())
        .bind(OffsetDateTime::now_utc())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_repository(&self, repo: &RepositoryName) -> MetadataResult<()> {
        let result = sqlx::query("DELETE FROM repository_allowlist WHERE repository = $1")
            .bind(repo.full_name())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("repository {repo}")));
        }
        Ok(())
    }

    async fn list_repositories(&self) -> MetadataResult<Vec<AllowlistRow>> {
        let rows = sqlx::query_as::<_, AllowlistRow>(
            "SELECT * FROM repository_allowlist ORDER BY repository",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
