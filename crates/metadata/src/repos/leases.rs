//! Lease repository.
//!
//! A lease is a pair of timestamps on a row. It may be taken when both the
//! TTL has passed since the last `indexing_began` and the reindex period has
//! passed since the last `indexing_finished`. Taking a lease is one
//! conditional `UPDATE`, so concurrent callers in any process race safely.
//!
//! Every `now` argument is `None` outside tests: the store then reads the
//! database clock, so the instants compared and written all come from one
//! clock no matter which host issued the call. `Some` pins the instant.

use crate::error::MetadataResult;
use crate::models::Lease;
use async_trait::async_trait;
use modindex_core::RepoId;
use std::time::Duration;
use time::OffsetDateTime;

/// Repository for lease acquisition and completion.
#[async_trait]
pub trait LeaseRepo: Send + Sync {
    /// Try to take the singleton repository-list lease.
    ///
    /// Sets `indexing_began = now` and returns true only if
    /// `now - indexing_began >= ttl` and `now - indexing_finished >= period`.
    async fn try_acquire_global_lease(
        &self,
        ttl: Duration,
        period: Duration,
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<bool>;

    /// Record completion of a repository-list crawl.
    async fn finish_global_lease(&self, now: Option<OffsetDateTime>) -> MetadataResult<()>;

    /// Read the repository-list lease.
    async fn get_global_lease(&self) -> MetadataResult<Lease>;

    /// Try to take the most overdue eligible repository lease.
    ///
    /// Among rows satisfying the same predicate as the global lease, picks
    /// the one with the oldest `indexing_finished` (ties broken by
    /// `repo_id`), sets its `indexing_began = now`, and returns its id.
    async fn try_acquire_repo_lease(
        &self,
        ttl: Duration,
        period: Duration,
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<Option<RepoId>>;

    /// Record completion of a tag crawl without touching its tags.
    ///
    /// Used when a crawl found no tags. Returns `NotFound` for unknown repos.
    async fn finish_repo_lease(
        &self,
        repo_id: &RepoId,
        now: Option<OffsetDateTime>,
    ) -> MetadataResult<()>;

    /// Read a repository lease.
    async fn get_repo_lease(&self, repo_id: &RepoId) -> MetadataResult<Option<Lease>>;
}
