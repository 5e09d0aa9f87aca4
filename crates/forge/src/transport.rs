//! Transport abstraction: issue one forge query, get one typed page back.

use crate::error::ForgeResult;
use async_trait::async_trait;
use modindex_core::{RepoId, TagDate};

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor to pass as `after` for the next page.
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

impl<T> Page<T> {
    /// A page with no successor.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            end_cursor: None,
            has_next_page: false,
        }
    }
}

/// A repository returned by the search listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryNode {
    /// Web URL of the repository, e.g. `https://forge.example/acme/widgets`.
    pub url: String,
}

/// A tag ref returned by the tag listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRefNode {
    pub name: String,
    pub date: TagDate,
}

/// Outcome of fetching a `go.mod` file at a tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleFile {
    Found(String),
    NotFound,
    /// The file exceeds `limit` bytes and was not read in full.
    TooLarge { limit: usize },
}

/// Query interface to a forge.
///
/// Each call performs one request. Pagination, timeouts, and module path
/// resolution live in [`crate::ForgeClient`].
#[async_trait]
pub trait ForgeTransport: Send + Sync {
    /// Search repositories matching `query`.
    async fn search_repositories(
        &self,
        query: &str,
        first: u32,
        after: Option<&str>,
    ) -> ForgeResult<Page<RepositoryNode>>;

    /// List tag refs of a repository, newest commit first.
    async fn list_tag_refs(
        &self,
        repo: &RepoId,
        first: u32,
        after: Option<&str>,
    ) -> ForgeResult<Page<TagRefNode>>;

    /// Fetch `go.mod` as it existed at `tag`.
    async fn fetch_module_file(&self, repo: &RepoId, tag: &str) -> ForgeResult<ModuleFile>;
}
