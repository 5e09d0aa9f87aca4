//! Catalog repository: discovered repositories and their tags.

use crate::error::MetadataResult;
use async_trait::async_trait;
use modindex_core::{FeedEntry, RepoId, RepoTag};
use time::OffsetDateTime;

/// Repository for catalog writes and reads.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Insert newly discovered repositories with never-run leases.
    ///
    /// Repositories already present keep their lease state. Returns the
    /// number of rows inserted.
    async fn store_repos(&self, repos: &[RepoId]) -> MetadataResult<u64>;

    /// Replace the tag set of a repository and finish its lease.
    ///
    /// Deletes every stored tag of `repo_id`, inserts `tags`, and sets the
    /// repository's `indexing_finished = now` in one transaction. Readers
    /// never observe a partially replaced set. A tag name given twice keeps
    /// its first occurrence. `None` stamps the database clock, as for leases.
    async fn store_repo_tags(
        &self,
        repo_id: &RepoId,
        tags: &[RepoTag],
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<()>;

    /// List the stored tags of a repository, ordered by tag name.
    async fn list_repo_tags(&self, repo_id: &RepoId) -> MetadataResult<Vec<RepoTag>>;

    /// Count discovered repositories.
    async fn count_repos(&self) -> MetadataResult<i64>;

    /// Query the catalog feed.
    ///
    /// Without `since`, returns the `limit` newest tags. With `since`, returns
    /// the `limit` tags created at or after `since` that are closest to it.
    /// Both are returned newest first.
    async fn fetch_feed(
        &self,
        since: Option<OffsetDateTime>,
        limit: i64,
    ) -> MetadataResult<Vec<FeedEntry>>;
}
