//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{CatalogRepo, LeaseRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: LeaseRepo + CatalogRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
///
/// Every lease operation is a single statement, and SQLite serializes
/// writers, so leases are exclusive among all processes sharing the file.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store, creating the file and schema if needed.
    pub async fn new(
        path: impl AsRef<Path>,
        busy_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(busy_timeout_secs.unwrap_or(5)));

        let pool = SqlitePoolOptions::new()
            // One writer at a time; a single connection avoids "database is locked"
            // between the tag workers of this process.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        tracing::debug!(path = %path.display(), "SQLite metadata store opened");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO global_lease (id, indexing_began, indexing_finished) VALUES (1, ?, ?)",
        )
        .bind(crate::models::infinite_past_millis())
        .bind(crate::models::infinite_past_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use modindex_core::{FeedEntry, RepoId, RepoTag};
    use time::OffsetDateTime;

    #[async_trait]
    impl LeaseRepo for SqliteStore {
        async fn try_acquire_global_lease(
            &self,
            ttl: Duration,
            period: Duration,
            now: Option<OffsetDateTime>,
        ) -> MetadataResult<bool> {
            let result = sqlx::query(
                "WITH clock AS (SELECT COALESCE(?1, CAST(ROUND((julianday('now') - 2440587.5) * 86400000) AS INTEGER)) AS now_ms)
                 UPDATE global_lease SET indexing_began = (SELECT now_ms FROM clock)
                 WHERE id = 1
                   AND indexing_began <= (SELECT now_ms FROM clock) - ?2
                   AND indexing_finished <= (SELECT now_ms FROM clock) - ?3",
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
                 SET indexing_finished = COALESCE(?, CAST(ROUND((julianday('now') - 2440587.5) * 86400000) AS INTEGER))
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
            let repo_id: Option<String> = sqlx::query_scalar(
                "WITH clock AS (SELECT COALESCE(?1, CAST(ROUND((julianday('now') - 2440587.5) * 86400000) AS INTEGER)) AS now_ms)
                 UPDATE repos SET indexing_began = (SELECT now_ms FROM clock)
                 WHERE repo_id = (
                     SELECT repo_id FROM repos
                     WHERE indexing_began <= (SELECT now_ms FROM clock) - ?2
                       AND indexing_finished <= (SELECT now_ms FROM clock) - ?3
                     ORDER BY indexing_finished ASC, repo_id ASC
                     LIMIT 1
                 )
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
                "SELECT repo_id, indexing_began, indexing_finished FROM repos WHERE repo_id = ?",
            )
            .bind(repo_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
            row.map(RepoLeaseRow::into_lease).transpose()
        }
    }

    #[async_trait]
    impl CatalogRepo for SqliteStore {
        async fn store_repos(&self, repos: &[RepoId]) -> MetadataResult<u64> {
            if repos.is_empty() {
                return Ok(0);
            }

            let never = infinite_past_millis();
            let mut inserted = 0;
            let mut tx = self.pool.begin().await?;
            for repo in repos {
                let result = sqlx::query(
                    "INSERT INTO repos (repo_id, indexing_began, indexing_finished) VALUES (?, ?, ?)
                     ON CONFLICT (repo_id) DO NOTHING",
                )
                .bind(repo.to_string())
                .bind(never)
                .bind(never)
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }
            tx.commit().await?;
            Ok(inserted)
        }

        async fn store_repo_tags(
            &self,
            repo_id: &RepoId,
            tags: &[RepoTag],
            now: Option<OffsetDateTime>,
        ) -> MetadataResult<()> {
            let repo = repo_id.to_string();
            let mut tx = self.pool.begin().await?;

            sqlx::query("DELETE FROM repo_tags WHERE repo_id = ?")
                .bind(&repo)
                .execute(&mut *tx)
                .await?;

            for tag in tags {
                if tag.repo_id != *repo_id {
                    return Err(MetadataError::Internal(format!(
                        "tag {} belongs to {}, not {repo_id}",
                        tag.tag_name, tag.repo_id
                    )));
                }
                // A repeated tag name keeps its first occurrence.
                sqlx::query(
                    "INSERT INTO repo_tags (repo_id, tag_name, module_path, created) VALUES (?, ?, ?, ?)
                     ON CONFLICT (repo_id, tag_name) DO NOTHING",
                )
                .bind(&repo)
                .bind(&tag.tag_name)
                .bind(tag.module_path.as_str())
                .bind(to_millis(tag.created))
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
                 WHERE repo_id = ? ORDER BY tag_name",
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
                         LIMIT ?",
                    )
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
                }
                Some(since) => {
                    sqlx::query_as::<_, FeedRow>(
                        "SELECT module_path, tag_name, created FROM (
                             SELECT repo_id, module_path, tag_name, created FROM repo_tags
                             WHERE created >= ?
                             ORDER BY created ASC, repo_id ASC, tag_name ASC
                             LIMIT ?
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
}

/// Stamp `indexing_finished` with the given instant or the database clock.
const FINISH_REPO_SQL: &str = "UPDATE repos
    SET indexing_finished = COALESCE(?, CAST(ROUND((julianday('now') - 2440587.5) * 86400000) AS INTEGER))
    WHERE repo_id = ?";

const SCHEMA_SQL: &str = r#"
-- Singleton repository-list lease
CREATE TABLE IF NOT EXISTS global_lease (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    indexing_began INTEGER NOT NULL,
    indexing_finished INTEGER NOT NULL
);

-- Discovered repositories and their tag-crawl leases
CREATE TABLE IF NOT EXISTS repos (
    repo_id TEXT PRIMARY KEY,
    indexing_began INTEGER NOT NULL,
    indexing_finished INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_repos_indexing_finished ON repos(indexing_finished);

-- Authoritative tag set per repository
CREATE TABLE IF NOT EXISTS repo_tags (
    repo_id TEXT NOT NULL,
    tag_name TEXT NOT NULL,
    module_path TEXT NOT NULL,
    created INTEGER NOT NULL,
    PRIMARY KEY (repo_id, tag_name)
);

CREATE INDEX IF NOT EXISTS idx_repo_tags_created ON repo_tags(created);
"#;
