//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::*;
use crate::repos::{CatalogRepo, LeaseRepo};
use crate::store::MetadataStore;
use async_trait::async_trait;
use modindex_core::config::PgSslMode;
use modindex_core::{FeedEntry, RepoId, RepoTag};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Stamp `indexing_finished` with the given instant or the database clock.
const FINISH_REPO_SQL: &str = "UPDATE repos
    SET indexing_finished = COALESCE($1::bigint, (extract(epoch FROM now()) * 1000)::bigint)
    WHERE repo_id = $2";

/// PostgreSQL-based metadata store.
///
/// The store shared by every indexer instance in a multi-instance deployment.
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
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    /// Create a new PostgreSQL store from individual connection parameters.
    #[allow(clippy::too_many_arguments)]
    pub async fn from_params(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        database: &str,
        ssl_mode: Option<PgSslMode>,
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
            let sqlx_mode = match mode {
                PgSslMode::Disable => SqlxPgSslMode::Disable,
                PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                PgSslMode::Require => SqlxPgSslMode::Require,
            };
            opts = opts.ssl_mode(sqlx_mode);
        }

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
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements cannot hold several commands.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        sqlx::query(
            "INSERT INTO global_lease (id, indexing_began, indexing_finished) VALUES (1, $1, $1)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(infinite_past_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LeaseRepo for PostgresStore {
    async fn try_acquire_global_lease(
        &self,
        ttl: Duration,
        period: Duration,
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<bool> {
        let result = sqlx::query(
            "WITH clock AS (SELECT COALESCE($1::bigint, (extract(epoch FROM now()) * 1000)::bigint) AS now_ms)
             UPDATE global_lease SET indexing_began = (SELECT now_ms FROM clock)
             WHERE id = 1
               AND indexing_began <= (SELECT now_ms FROM clock) - $2
               AND indexing_finished <= (SELECT now_ms FROM clock) - $3",
        )
        .bind(clock_millis(now))
        .bind(span_millis(ttl))
        .bind(span_millis(period))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn finish_global_lease(&self, now: Option<OffsetDateTime>) -> MetadataResult<()> {
        sqlx::query(
            "UPDATE global_lease
             SET indexing_finished = COALESCE($1::bigint, (extract(epoch FROM now()) * 1000)::bigint)
             WHERE id = 1",
        )
        .bind(clock_millis(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_global_lease(&self) -> MetadataResult<Lease> {
        let row = sqlx::query_as::<_, GlobalLeaseRow>(
            "SELECT indexing_began, indexing_finished FROM global_lease WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| MetadataError::NotFound("global lease row".to_string()))?;
        row.into_lease()
    }

    async fn try_acquire_repo_lease(
        &self,
        ttl: Duration,
        period: Duration,
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<Option<RepoId>> {
        // The outer predicate is re-checked against the row version the
        // UPDATE locks, so a row taken by a concurrent caller after the
        // subselect ran is skipped rather than taken twice.
        let repo_id: Option<String> = sqlx::query_scalar(
            "WITH clock AS (SELECT COALESCE($1::bigint, (extract(epoch FROM now()) * 1000)::bigint) AS now_ms)
             UPDATE repos SET indexing_began = (SELECT now_ms FROM clock)
             WHERE repo_id = (
                 SELECT repo_id FROM repos
                 WHERE indexing_began <= (SELECT now_ms FROM clock) - $2
                   AND indexing_finished <= (SELECT now_ms FROM clock) - $3
                 ORDER BY indexing_finished ASC, repo_id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             AND indexing_began <= (SELECT now_ms FROM clock) - $2
             AND indexing_finished <= (SELECT now_ms FROM clock) - $3
             RETURNING repo_id",
        )
        .bind(clock_millis(now))
        .bind(span_millis(ttl))
        .bind(span_millis(period))
        .fetch_optional(&self.pool)
        .await?;

        Ok(repo_id.map(|id| RepoId::parse(&id)).transpose()?)
    }

    async fn finish_repo_lease(
        &self,
        repo_id: &RepoId,
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<()> {
        let result = sqlx::query(FINISH_REPO_SQL)
            .bind(clock_millis(now))
            .bind(repo_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("repo {repo_id}")));
        }
        Ok(())
    }

    async fn get_repo_lease(&self, repo_id: &RepoId) -> MetadataResult<Option<Lease>> {
        let row = sqlx::query_as::<_, RepoLeaseRow>(
            "SELECT repo_id, indexing_began, indexing_finished FROM repos WHERE repo_id = $1",
        )
        .bind(repo_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RepoLeaseRow::into_lease).transpose()
    }
}

#[async_trait]
impl CatalogRepo for PostgresStore {
    async fn store_repos(&self, repos: &[RepoId]) -> MetadataResult<u64> {
        if repos.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = repos.iter().map(ToString::to_string).collect();
        let result = sqlx::query(
            "INSERT INTO repos (repo_id, indexing_began, indexing_finished)
             SELECT id, $2, $2 FROM UNNEST($1::text[]) AS t(id)
             ON CONFLICT (repo_id) DO NOTHING",
        )
        .bind(&ids)
        .bind(infinite_past_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn store_repo_tags(
        &self,
        repo_id: &RepoId,
        tags: &[RepoTag],
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<()> {
        if let Some(stray) = tags.iter().find(|t| t.repo_id != *repo_id) {
            return Err(MetadataError::Internal(format!(
                "tag {} belongs to {}, not {repo_id}",
                stray.tag_name, stray.repo_id
            )));
        }

        // A repeated tag name keeps its first occurrence. One INSERT cannot
        // touch a row twice, so repeats are dropped before the arrays are built.
        let mut seen = HashSet::new();
        let unique: Vec<&RepoTag> = tags
            .iter()
            .filter(|t| seen.insert(t.tag_name.as_str()))
            .collect();

        let repo = repo_id.to_string();
        let names: Vec<&str> = unique.iter().map(|t| t.tag_name.as_str()).collect();
        let paths: Vec<&str> = unique.iter().map(|t| t.module_path.as_str()).collect();
        let created: Vec<i64> = unique.iter().map(|t| to_millis(t.created)).collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM repo_tags WHERE repo_id = $1")
            .bind(&repo)
            .execute(&mut *tx)
            .await?;

        if !unique.is_empty() {
            sqlx::query(
                "INSERT INTO repo_tags (repo_id, tag_name, module_path, created)
                 SELECT $1, name, path, created
                 FROM UNNEST($2::text[], $3::text[], $4::bigint[]) AS t(name, path, created)
                 ON CONFLICT (repo_id, tag_name) DO NOTHING",
            )
            .bind(&repo)
            .bind(&names)
            .bind(&paths)
            .bind(&created)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(FINISH_REPO_SQL)
            .bind(clock_millis(now))
            .bind(&repo)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(format!("repo {repo_id}")));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_repo_tags(&self, repo_id: &RepoId) -> MetadataResult<Vec<RepoTag>> {
        let rows = sqlx::query_as::<_, RepoTagRow>(
            "SELECT repo_id, tag_name, module_path, created FROM repo_tags
             WHERE repo_id = $1 ORDER BY tag_name",
        )
        .bind(repo_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RepoTagRow::into_tag).collect()
    }

    async fn count_repos(&self) -> MetadataResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM repos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn fetch_feed(
        &self,
        since: Option<OffsetDateTime>,
        limit: i64,
    ) -> MetadataResult<Vec<FeedEntry>> {
        let rows = match since {
            None => {
                sqlx::query_as::<_, FeedRow>(
                    "SELECT module_path, tag_name, created FROM repo_tags
                     ORDER BY created DESC, repo_id DESC, tag_name DESC
                     LIMIT $1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            Some(since) => {
                sqlx::query_as::<_, FeedRow>(
                    "SELECT module_path, tag_name, created FROM (
                         SELECT repo_id, module_path, tag_name, created FROM repo_tags
                         WHERE created >= $1
                         ORDER BY created ASC, repo_id ASC, tag_name ASC
                         LIMIT $2
                     ) AS nearest
                     ORDER BY created DESC, repo_id DESC, tag_name DESC",
                )
                .bind(to_millis(since))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(FeedRow::into_entry).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_split() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert_eq!(statements.len(), 5);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS global_lease"));
        assert!(statements.iter().all(|s| !s.ends_with(';')));
    }

    #[test]
    fn test_schema_statements_skip_comment_only_chunks() {
        let statements = postgres_schema_statements("-- only a comment\n;\nSELECT 1;\n  ;");
        assert_eq!(statements, vec!["SELECT 1"]);
    }
}
