//! Forge client: pagination, tag crawls, and module path resolution.

use crate::error::{ForgeError, ForgeResult};
use crate::http::HttpTransport;
use crate::transport::{ForgeTransport, ModuleFile, TagRefNode};
use futures::{Stream, StreamExt};
use modindex_core::config::ForgeConfig;
use modindex_core::{ModuleDeclaration, ModulePath, RepoId, RepoTag};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Lazy, one-shot stream of repository ids.
pub type RepoStream<'a> = Pin<Box<dyn Stream<Item = ForgeResult<RepoId>> + Send + 'a>>;

/// Lazy, one-shot stream of tag refs.
pub type TagStream<'a> = Pin<Box<dyn Stream<Item = ForgeResult<TagRefNode>> + Send + 'a>>;

/// How a tag's module path was determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleResolution {
    /// Declared by the tag's `go.mod`.
    Declared(ModulePath),
    /// No `go.mod` (or no `module` directive); derived from the forge location.
    Fallback(ModulePath),
    /// `go.mod` exists but is unusable. The tag must not be published.
    Unresolvable(String),
}

impl ModuleResolution {
    /// The module path, unless unresolvable.
    pub fn path(&self) -> Option<&ModulePath> {
        match self {
            ModuleResolution::Declared(p) | ModuleResolution::Fallback(p) => Some(p),
            ModuleResolution::Unresolvable(_) => None,
        }
    }
}

/// Result of crawling one repository's tags.
#[derive(Debug, Clone, Default)]
pub struct TagCrawl {
    /// Tags to store, in listing order.
    pub tags: Vec<RepoTag>,
    /// Tags dropped because their module path was unresolvable.
    pub skipped: usize,
    /// Stored tags whose date the forge did not report.
    pub undated: usize,
}

/// Client for crawling a forge through a [`ForgeTransport`].
#[derive(Clone)]
pub struct ForgeClient {
    transport: Arc<dyn ForgeTransport>,
    host_name: String,
    repo_url_prefix: String,
    search_query: String,
    page_size: u32,
    call_timeout: Duration,
}

impl ForgeClient {
    /// Create a client over an arbitrary transport.
    pub fn new(transport: Arc<dyn ForgeTransport>, config: &ForgeConfig) -> Self {
        Self {
            transport,
            host_name: config.host_name.clone(),
            repo_url_prefix: config.repo_url_prefix(),
            search_query: config.search_query.clone(),
            page_size: config.page_size,
            call_timeout: config.request_timeout(),
        }
    }

    /// Create a client talking HTTP to the configured forge.
    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        let transport = HttpTransport::from_config(config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Bound a single transport call by the per-call timeout.
    async fn call<T>(&self, fut: impl Future<Output = ForgeResult<T>>) -> ForgeResult<T> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| ForgeError::Timeout(self.call_timeout))?
    }

    /// List every repository matching the search query, following cursors.
    ///
    /// URLs outside the forge's `https://{host}/org/name` namespace are
    /// skipped with a warning.
    pub fn list_repositories(&self) -> RepoStream<'_> {
        Box::pin(async_stream::try_stream! {
            let mut cursor: Option<String> = None;
            loop {
                let page = self
                    .call(self.transport.search_repositories(
                        &self.search_query,
                        self.page_size,
                        cursor.as_deref(),
                    ))
                    .await?;

                for node in page.items {
                    match RepoId::from_url(&self.repo_url_prefix, &node.url) {
                        Ok(repo) => yield repo,
                        Err(e) => tracing::warn!(
                            url = %node.url,
                            error = %e,
                            "Skipping repository outside the forge namespace"
                        ),
                    }
                }

                if !page.has_next_page {
                    break;
                }
                cursor = Some(page.end_cursor.ok_or_else(|| {
                    ForgeError::Decode("page has a successor but no end cursor".to_string())
                })?);
            }
        })
    }

    /// List a repository's tags, newest commit first, following cursors.
    pub fn list_tags<'a>(&'a self, repo: &'a RepoId) -> TagStream<'a> {
        Box::pin(async_stream::try_stream! {
            let mut cursor: Option<String> = None;
            loop {
                let page = self
                    .call(self.transport.list_tag_refs(repo, self.page_size, cursor.as_deref()))
                    .await?;

                for node in page.items {
                    yield node;
                }

                if !page.has_next_page {
                    break;
                }
                cursor = Some(page.end_cursor.ok_or_else(|| {
                    ForgeError::Decode("page has a successor but no end cursor".to_string())
                })?);
            }
        })
    }

    /// Determine the module path of `repo` at `tag`.
    pub async fn resolve_module_path(
        &self,
        repo: &RepoId,
        tag: &str,
    ) -> ForgeResult<ModuleResolution> {
        let file = self
            .call(self.transport.fetch_module_file(repo, tag))
            .await?;

        let contents = match file {
            ModuleFile::NotFound => {
                return Ok(ModuleResolution::Fallback(ModulePath::from_forge(
                    &self.host_name,
                    repo,
                )));
            }
            ModuleFile::TooLarge { limit } => {
                return Ok(ModuleResolution::Unresolvable(format!(
                    "go.mod exceeds {limit} bytes"
                )));
            }
            ModuleFile::Found(contents) => contents,
        };

        Ok(match ModuleDeclaration::parse(&contents) {
            Ok(ModuleDeclaration::Declared(path)) => ModuleResolution::Declared(path),
            Ok(ModuleDeclaration::Missing) => {
                ModuleResolution::Fallback(ModulePath::from_forge(&self.host_name, repo))
            }
            Err(e) => ModuleResolution::Unresolvable(e.to_string()),
        })
    }

    /// Crawl every tag of `repo` and resolve its module path.
    ///
    /// Unresolvable tags are dropped from the result; any forge error aborts
    /// the crawl. A tag listed twice (the listing shifted between pages)
    /// keeps its first, newest-first occurrence.
    pub async fn crawl_tags(&self, repo: &RepoId) -> ForgeResult<TagCrawl> {
        let mut crawl = TagCrawl::default();
        let mut seen = HashSet::new();
        let mut tags = self.list_tags(repo);

        while let Some(node) = tags.next().await {
            let node = node?;
            if !seen.insert(node.name.clone()) {
                tracing::debug!(repo_id = %repo, tag = %node.name, "Ignoring repeated tag ref");
                continue;
            }
            let path = match self.resolve_module_path(repo, &node.name).await? {
                ModuleResolution::Declared(path) | ModuleResolution::Fallback(path) => path,
                ModuleResolution::Unresolvable(reason) => {
                    tracing::warn!(
                        repo_id = %repo,
                        tag = %node.name,
                        reason = %reason,
                        "Skipping tag with unusable go.mod"
                    );
                    crawl.skipped += 1;
                    continue;
                }
            };

            if node.date.effective().is_none() {
                tracing::warn!(repo_id = %repo, tag = %node.name, "Forge reported no date for tag");
                crawl.undated += 1;
            }
            tracing::debug!(
                repo_id = %repo,
                tag = %node.name,
                module_path = %path,
                date_source = node.date.source(),
                "Resolved tag"
            );
            crawl
                .tags
                .push(RepoTag::new(repo.clone(), node.name, path, node.date));
        }

        Ok(crawl)
    }
}
