//! Scripted in-memory transport for tests.
//!
//! Pages are addressed by cursor (`repos-cursor-{i}` / `tags-cursor-{i}`),
//! so a listing can be replayed any number of times. Failures are one-shot
//! and fire on the call whose `after` cursor matches.

use crate::error::{ForgeError, ForgeResult};
use crate::transport::{ForgeTransport, ModuleFile, Page, RepositoryNode, TagRefNode};
use async_trait::async_trait;
use modindex_core::RepoId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Host the scripted repository URLs live under.
pub const SCRIPTED_HOST: &str = "forge.test";

#[derive(Default)]
struct Script {
    repo_pages: Vec<Vec<String>>,
    search_failures: HashMap<Option<String>, VecDeque<ForgeError>>,
    tag_pages: HashMap<String, Vec<Vec<TagRefNode>>>,
    tag_failures: HashMap<String, VecDeque<ForgeError>>,
    module_files: HashMap<(String, String), ForgeResult<ModuleFile>>,
    latency: Option<Duration>,
    search_cursors: Vec<Option<String>>,
    tag_calls: HashMap<String, usize>,
    module_calls: usize,
}

/// A [`ForgeTransport`] returning pre-programmed pages.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

fn cursor_index(prefix: &str, after: Option<&str>) -> ForgeResult<usize> {
    match after {
        None => Ok(0),
        Some(cursor) => cursor
            .strip_prefix(prefix)
            .and_then(|i| i.parse::<usize>().ok())
            .map(|i| i + 1)
            .ok_or_else(|| ForgeError::GraphQl(format!("unknown cursor {cursor}"))),
    }
}

fn page_of<T: Clone>(pages: &[Vec<T>], index: usize, prefix: &str) -> Page<T> {
    let items = pages.get(index).cloned().unwrap_or_default();
    let has_next_page = index + 1 < pages.len();
    Page {
        items,
        end_cursor: has_next_page.then(|| format!("{prefix}{index}")),
        has_next_page,
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Repository listing given as `org/name` ids under [`SCRIPTED_HOST`].
    pub fn with_repo_pages(self, pages: Vec<Vec<&str>>) -> Self {
        self.set_repo_pages(pages);
        self
    }

    /// Replace the repository listing.
    pub fn set_repo_pages(&self, pages: Vec<Vec<&str>>) {
        self.script().repo_pages = pages
            .into_iter()
            .map(|page| {
                page.into_iter()
                    .map(|id| format!("https://{SCRIPTED_HOST}/{id}"))
                    .collect()
            })
            .collect();
    }

    /// Repository listing given as raw URLs.
    pub fn with_repo_urls(self, pages: Vec<Vec<String>>) -> Self {
        self.script().repo_pages = pages;
        self
    }

    /// Fail the next search request whose `after` cursor equals `after`.
    pub fn fail_search_at(self, after: Option<&str>, err: ForgeError) -> Self {
        self.push_search_failure(after, err);
        self
    }

    /// Queue a one-shot search failure.
    pub fn push_search_failure(&self, after: Option<&str>, err: ForgeError) {
        self.script()
            .search_failures
            .entry(after.map(str::to_string))
            .or_default()
            .push_back(err);
    }

    /// Tag listing for `repo`.
    pub fn with_tag_pages(self, repo: &str, pages: Vec<Vec<TagRefNode>>) -> Self {
        self.set_tag_pages(repo, pages);
        self
    }

    /// Replace the tag listing for `repo`.
    pub fn set_tag_pages(&self, repo: &str, pages: Vec<Vec<TagRefNode>>) {
        self.script().tag_pages.insert(repo.to_string(), pages);
    }

    /// Fail the next first-page tag request for `repo`.
    pub fn fail_tags(self, repo: &str, err: ForgeError) -> Self {
        self.push_tag_failure(repo, err);
        self
    }

    /// Queue a one-shot tag listing failure for `repo`.
    pub fn push_tag_failure(&self, repo: &str, err: ForgeError) {
        self.script()
            .tag_failures
            .entry(repo.to_string())
            .or_default()
            .push_back(err);
    }

    /// `go.mod` contents at `repo`@`tag`. Unscripted files are not found.
    pub fn with_module_file(self, repo: &str, tag: &str, contents: &str) -> Self {
        self.with_module_result(repo, tag, ModuleFile::Found(contents.to_string()))
    }

    /// Raw fetch outcome for `go.mod` at `repo`@`tag`.
    pub fn with_module_result(self, repo: &str, tag: &str, file: ModuleFile) -> Self {
        self.script()
            .module_files
            .insert((repo.to_string(), tag.to_string()), Ok(file));
        self
    }

    /// Persistent error when fetching `go.mod` at `repo`@`tag`.
    pub fn with_module_error(self, repo: &str, tag: &str, err: ForgeError) -> Self {
        self.script()
            .module_files
            .insert((repo.to_string(), tag.to_string()), Err(err));
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.script().latency = Some(latency);
        self
    }

    /// `after` cursors of every search request, in call order.
    pub fn search_cursors(&self) -> Vec<Option<String>> {
        self.script().search_cursors.clone()
    }

    /// Number of tag listing requests made for `repo`.
    pub fn tag_calls(&self, repo: &str) -> usize {
        self.script().tag_calls.get(repo).copied().unwrap_or(0)
    }

    /// Number of `go.mod` fetches.
    pub fn module_calls(&self) -> usize {
        self.script().module_calls
    }

    async fn delay(&self) {
        let latency = self.script().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ForgeTransport for ScriptedTransport {
    async fn search_repositories(
        &self,
        _query: &str,
        _first: u32,
        after: Option<&str>,
    ) -> ForgeResult<Page<RepositoryNode>> {
        self.delay().await;
        let mut script = self.script();
        script.search_cursors.push(after.map(str::to_string));

        let key = after.map(str::to_string);
        if let Some(err) = script
            .search_failures
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let index = cursor_index("repos-cursor-", after)?;
        let page = page_of(&script.repo_pages, index, "repos-cursor-");
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|url| RepositoryNode { url })
                .collect(),
            end_cursor: page.end_cursor,
            has_next_page: page.has_next_page,
        })
    }

    async fn list_tag_refs(
        &self,
        repo: &RepoId,
        _first: u32,
        after: Option<&str>,
    ) -> ForgeResult<Page<TagRefNode>> {
        self.delay().await;
        let key = repo.to_string();
        let mut script = self.script();
        *script.tag_calls.entry(key.clone()).or_default() += 1;

        if after.is_none() {
            if let Some(err) = script
                .tag_failures
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
        }

        let index = cursor_index("tags-cursor-", after)?;
        Ok(match script.tag_pages.get(&key) {
            Some(pages) => page_of(pages, index, "tags-cursor-"),
            None => Page::last(Vec::new()),
        })
    }

    async fn fetch_module_file(&self, repo: &RepoId, tag: &str) -> ForgeResult<ModuleFile> {
        self.delay().await;
        let mut script = self.script();
        script.module_calls += 1;
        script
            .module_files
            .get(&(repo.to_string(), tag.to_string()))
            .cloned()
            .unwrap_or(Ok(ModuleFile::NotFound))
    }
}
