//! Database models mapping to the metadata schema.
//!
//! Timestamps are stored as Unix milliseconds (UTC) in both backends so that
//! comparisons and ordering behave identically.

use crate::error::{MetadataError, MetadataResult};
use modindex_core::{FeedEntry, ModulePath, RepoId, RepoTag};
use sqlx::FromRow;
use std::time::Duration;
use time::OffsetDateTime;

/// Convert a timestamp to stored milliseconds.
pub fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Convert stored milliseconds back to a UTC timestamp.
pub fn from_millis(ms: i64) -> MetadataResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| MetadataError::CorruptRow(format!("timestamp {ms}ms out of range: {e}")))
}

/// Caller-pinned lease clock, or `None` to read the database clock.
pub fn clock_millis(now: Option<OffsetDateTime>) -> Option<i64> {
    now.map(to_millis)
}

/// Lease span in milliseconds, capped so `now - span` stays in range
/// while still reaching below [`infinite_past_millis`].
pub fn span_millis(span: Duration) -> i64 {
    i64::try_from(span.as_millis()).map_or(MAX_SPAN_MILLIS, |ms| ms.min(MAX_SPAN_MILLIS))
}

const MAX_SPAN_MILLIS: i64 = i64::MAX / 4;

/// Stored value of [`modindex_core::INFINITE_PAST`].
pub fn infinite_past_millis() -> i64 {
    to_millis(modindex_core::INFINITE_PAST)
}

// =============================================================================
// Leases
// =============================================================================

/// Begin/finish timestamps of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub indexing_began: OffsetDateTime,
    pub indexing_finished: OffsetDateTime,
}

/// Singleton repository-list lease row.
#[derive(Debug, Clone, FromRow)]
pub struct GlobalLeaseRow {
    pub indexing_began: i64,
    pub indexing_finished: i64,
}

impl GlobalLeaseRow {
    pub fn into_lease(self) -> MetadataResult<Lease> {
        Ok(Lease {
            indexing_began: from_millis(self.indexing_began)?,
            indexing_finished: from_millis(self.indexing_finished)?,
        })
    }
}

/// Per-repository lease row.
#[derive(Debug, Clone, FromRow)]
pub struct RepoLeaseRow {
    pub repo_id: String,
    pub indexing_began: i64,
    pub indexing_finished: i64,
}

impl RepoLeaseRow {
    pub fn into_lease(self) -> MetadataResult<Lease> {
        Ok(Lease {
            indexing_began: from_millis(self.indexing_began)?,
            indexing_finished: from_millis(self.indexing_finished)?,
        })
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Stored tag row.
#[derive(Debug, Clone, FromRow)]
pub struct RepoTagRow {
    pub repo_id: String,
    pub tag_name: String,
    pub module_path: String,
    pub created: i64,
}

impl RepoTagRow {
    pub fn into_tag(self) -> MetadataResult<RepoTag> {
        Ok(RepoTag {
            repo_id: RepoId::parse(&self.repo_id)?,
            tag_name: self.tag_name,
            module_path: ModulePath::from_stored(self.module_path),
            created: from_millis(self.created)?,
        })
    }
}

/// Feed query row.
#[derive(Debug, Clone, FromRow)]
pub struct FeedRow {
    pub module_path: String,
    pub tag_name: String,
    pub created: i64,
}

impl FeedRow {
    pub fn into_entry(self) -> MetadataResult<FeedEntry> {
        Ok(FeedEntry {
            path: self.module_path,
            version: self.tag_name,
            timestamp: from_millis(self.created)?,
        })
    }
}
