//! Repository tags and their effective dates.

use crate::module_path::ModulePath;
use crate::repo::RepoId;
use time::{OffsetDateTime, UtcOffset};

/// Where a tag's effective date came from.
///
/// Lightweight tags point straight at a commit and carry the commit date.
/// Annotated tags carry the tagger's date. Built with [`TagDate::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagDate {
    /// Date of the commit the tag points at.
    Commit(OffsetDateTime),
    /// Date recorded by the tagger of an annotated tag.
    Tagger(OffsetDateTime),
    /// The forge reported neither date.
    Unknown,
}

impl TagDate {
    /// Resolve the effective date: commit date when set, else tagger date.
    ///
    /// A value equal to [`crate::INFINITE_PAST`] counts as unset, matching
    /// forges that report a zero timestamp instead of omitting the field.
    /// Resolved dates are normalized to UTC.
    pub fn resolve(commit: Option<OffsetDateTime>, tagger: Option<OffsetDateTime>) -> Self {
        let set = |d: Option<OffsetDateTime>| d.filter(|d| *d != crate::INFINITE_PAST);
        match (set(commit), set(tagger)) {
            (Some(c), _) => TagDate::Commit(c.to_offset(UtcOffset::UTC)),
            (None, Some(t)) => TagDate::Tagger(t.to_offset(UtcOffset::UTC)),
            (None, None) => TagDate::Unknown,
        }
    }

    /// The resolved date, if any.
    pub fn effective(&self) -> Option<OffsetDateTime> {
        match self {
            TagDate::Commit(d) | TagDate::Tagger(d) => Some(*d),
            TagDate::Unknown => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn source(&self) -> &'static str {
        match self {
            TagDate::Commit(_) => "commit",
            TagDate::Tagger(_) => "tagger",
            TagDate::Unknown => "unknown",
        }
    }
}

/// A resolved tag ready to be stored in the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoTag {
    pub repo_id: RepoId,
    pub tag_name: String,
    pub module_path: ModulePath,
    /// Effective date. [`crate::INFINITE_PAST`] when the forge gave none.
    pub created: OffsetDateTime,
}

impl RepoTag {
    /// Build a tag record, substituting the infinite past for an unknown date.
    pub fn new(
        repo_id: RepoId,
        tag_name: impl Into<String>,
        module_path: ModulePath,
        date: TagDate,
    ) -> Self {
        Self {
            repo_id,
            tag_name: tag_name.into(),
            module_path,
            created: date.effective().unwrap_or(crate::INFINITE_PAST),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_commit_date_only() {
        let c = datetime!(2025-01-02 03:04:05 UTC);
        let date = TagDate::resolve(Some(c), None);
        assert_eq!(date, TagDate::Commit(c));
        assert_eq!(date.effective(), Some(c));
    }

    #[test]
    fn test_tagger_date_only() {
        let t = datetime!(2025-02-03 04:05:06 UTC);
        let date = TagDate::resolve(None, Some(t));
        assert_eq!(date, TagDate::Tagger(t));
        assert_eq!(date.effective(), Some(t));
    }

    #[test]
    fn test_commit_date_wins_when_both_set() {
        let c = datetime!(2025-01-02 03:04:05 UTC);
        let t = datetime!(2025-02-03 04:05:06 UTC);
        assert_eq!(TagDate::resolve(Some(c), Some(t)), TagDate::Commit(c));
    }

    #[test]
    fn test_zero_commit_date_falls_through_to_tagger() {
        let t = datetime!(2025-02-03 04:05:06 UTC);
        let date = TagDate::resolve(Some(crate::INFINITE_PAST), Some(t));
        assert_eq!(date, TagDate::Tagger(t));
    }

    #[test]
    fn test_neither_date_is_unknown() {
        let date = TagDate::resolve(None, None);
        assert_eq!(date, TagDate::Unknown);
        assert_eq!(date.effective(), None);
        assert_eq!(date.source(), "unknown");
    }

    #[test]
    fn test_dates_normalized_to_utc() {
        let local = datetime!(2025-01-02 05:04:05 +02:00);
        let date = TagDate::resolve(Some(local), None);
        let effective = date.effective().unwrap();
        assert_eq!(effective.offset(), UtcOffset::UTC);
        assert_eq!(effective, datetime!(2025-01-02 03:04:05 UTC));
    }

    #[test]
    fn test_repo_tag_unknown_date_uses_infinite_past() {
        let tag = RepoTag::new(
            RepoId::parse("acme/widgets").unwrap(),
            "v1.0.0",
            ModulePath::parse("forge.example/acme/widgets").unwrap(),
            TagDate::Unknown,
        );
        assert_eq!(tag.created, crate::INFINITE_PAST);
    }
}
