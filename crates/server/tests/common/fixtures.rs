//! Test fixtures for building repositories and tags.

use modindex_core::{ModulePath, RepoId, RepoTag, TagDate};
use time::OffsetDateTime;
use time::macros::datetime;

/// Parse an `org/name` id, panicking on malformed input.
pub fn repo(id: &str) -> RepoId {
    RepoId::parse(id).expect("invalid repo id in test")
}

/// A fixed reference instant; tests offset from it instead of wall-clock time.
#[allow(dead_code)]
pub fn t0() -> OffsetDateTime {
    datetime!(2025-06-01 12:00 UTC)
}

/// `t0()` plus `secs` seconds (negative goes back in time).
#[allow(dead_code)]
pub fn at(secs: i64) -> OffsetDateTime {
    t0() + time::Duration::seconds(secs)
}

/// A tag with a forge-derived module path and the given commit date.
#[allow(dead_code)]
pub fn tag(repo_id: &RepoId, name: &str, created: OffsetDateTime) -> RepoTag {
    RepoTag::new(
        repo_id.clone(),
        name,
        ModulePath::from_forge("forge.test", repo_id),
        TagDate::Commit(created),
    )
}

/// A tag with an explicit module path.
#[allow(dead_code)]
pub fn tag_with_path(
    repo_id: &RepoId,
    name: &str,
    path: &str,
    created: OffsetDateTime,
) -> RepoTag {
    RepoTag::new(
        repo_id.clone(),
        name,
        ModulePath::parse(path).expect("invalid module path in test"),
        TagDate::Commit(created),
    )
}

/// Tag names of `tags`, in order.
#[allow(dead_code)]
pub fn tag_names(tags: &[RepoTag]) -> Vec<&str> {
    tags.iter().map(|t| t.tag_name.as_str()).collect()
}
