//! HTTP transport: GraphQL API for listings, raw file endpoint for `go.mod`.

use crate::error::{ForgeError, ForgeResult};
use crate::transport::{ForgeTransport, ModuleFile, Page, RepositoryNode, TagRefNode};
use async_trait::async_trait;
use modindex_core::config::ForgeConfig;
use modindex_core::{RepoId, TagDate};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use time::OffsetDateTime;

const SEARCH_REPOSITORIES: &str = r#"
query SearchRepositories($query: String!, $first: Int!, $after: String) {
  search(query: $query, type: REPOSITORY, first: $first, after: $after) {
    edges {
      node {
        ... on Repository { url }
      }
    }
    pageInfo { endCursor hasNextPage }
  }
}
"#;

const LIST_TAG_REFS: &str = r#"
query ListTagRefs($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    refs(
      refPrefix: "refs/tags/"
      orderBy: { field: TAG_COMMIT_DATE, direction: DESC }
      first: $first
      after: $after
    ) {
      nodes {
        name
        target {
          __typename
          ... on Commit { committedDate }
          ... on Tag { tagger { date } }
        }
      }
      pageInfo { endCursor hasNextPage }
    }
  }
}
"#;

/// Body snippet length kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Largest `go.mod` read into memory; bigger files are never valid module declarations.
pub const MAX_MODULE_FILE: usize = 1 << 20;

/// Forge transport over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    graphql_url: Url,
    raw_base_url: Url,
    token: String,
}

impl HttpTransport {
    /// Create a transport. Every request is bounded by `timeout`.
    pub fn new(
        graphql_url: &str,
        raw_base_url: &str,
        token: &str,
        timeout: Duration,
    ) -> ForgeResult<Self> {
        let graphql_url = Url::parse(graphql_url)
            .map_err(|e| ForgeError::Config(format!("invalid GraphQL URL {graphql_url}: {e}")))?;
        let raw_base_url = Url::parse(raw_base_url)
            .map_err(|e| ForgeError::Config(format!("invalid raw URL {raw_base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("modindex/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            graphql_url,
            raw_base_url,
            token: token.to_string(),
        })
    }

    /// Create a transport from forge configuration.
    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        Self::new(
            &config.graphql_url(),
            &config.raw_base_url(),
            &config.auth_token,
            config.request_timeout(),
        )
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> ForgeResult<T> {
        let response = self
            .http
            .post(self.graphql_url.clone())
            .bearer_auth(&self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: GraphQlResponse<T> = response.json().await?;

        if let Some(err) = body.errors.first() {
            let message = body
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(match err.kind.as_deref() {
                Some("RATE_LIMITED") => ForgeError::RateLimited(message),
                Some("NOT_FOUND") => ForgeError::RepoNotFound(message),
                _ => ForgeError::GraphQl(message),
            });
        }
        body.data
            .ok_or_else(|| ForgeError::Decode("GraphQL response has neither data nor errors".into()))
    }

    fn module_file_url(&self, repo: &RepoId, tag: &str) -> ForgeResult<Url> {
        let mut url = self.raw_base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ForgeError::Config(format!("raw URL {} cannot be a base", self.raw_base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(["raw", repo.org(), repo.name()])
                .extend(tag.split('/'))
                .push("go.mod");
        }
        Ok(url)
    }
}

#[async_trait]
impl ForgeTransport for HttpTransport {
    async fn search_repositories(
        &self,
        query: &str,
        first: u32,
        after: Option<&str>,
    ) -> ForgeResult<Page<RepositoryNode>> {
        let data: SearchData = self
            .graphql(
                SEARCH_REPOSITORIES,
                json!({ "query": query, "first": first, "after": after }),
            )
            .await?;

        let items = data
            .search
            .edges
            .into_iter()
            .filter_map(|edge| edge.node.and_then(|n| n.url))
            .map(|url| RepositoryNode { url })
            .collect();
        Ok(Page {
            items,
            end_cursor: data.search.page_info.end_cursor,
            has_next_page: data.search.page_info.has_next_page,
        })
    }

    async fn list_tag_refs(
        &self,
        repo: &RepoId,
        first: u32,
        after: Option<&str>,
    ) -> ForgeResult<Page<TagRefNode>> {
        let data: TagsData = self
            .graphql(
                LIST_TAG_REFS,
                json!({
                    "owner": repo.org(),
                    "name": repo.name(),
                    "first": first,
                    "after": after,
                }),
            )
            .await?;

        let refs = data
            .repository
            .ok_or_else(|| ForgeError::RepoNotFound(repo.to_string()))?
            .refs
            .ok_or_else(|| ForgeError::Decode(format!("no refs connection for {repo}")))?;

        let items = refs
            .nodes
            .into_iter()
            .map(|node| TagRefNode {
                date: node.target.map(RefTarget::date).unwrap_or(TagDate::Unknown),
                name: node.name,
            })
            .collect();
        Ok(Page {
            items,
            end_cursor: refs.page_info.end_cursor,
            has_next_page: refs.page_info.has_next_page,
        })
    }

    async fn fetch_module_file(&self, repo: &RepoId, tag: &str) -> ForgeResult<ModuleFile> {
        let url = self.module_file_url(repo, tag)?;
        let response = self
            .http
            .get(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("token {}", self.token),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(ModuleFile::NotFound);
        }
        let mut response = check_status(response).await?;
        if response
            .content_length()
            .is_some_and(|len| len > MAX_MODULE_FILE as u64)
        {
            return Ok(ModuleFile::TooLarge {
                limit: MAX_MODULE_FILE,
            });
        }

        // Chunked or lying about its length: count as we go.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_MODULE_FILE {
                tracing::debug!(repo_id = %repo, tag, "Abandoning oversized go.mod download");
                return Ok(ModuleFile::TooLarge {
                    limit: MAX_MODULE_FILE,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(ModuleFile::Found(String::from_utf8_lossy(&body).into_owned()))
    }
}

/// Map non-success responses to errors, separating rate limits from other failures.
async fn check_status(response: Response) -> ForgeResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        == Some("0");
    let retry_after = response.headers().contains_key(reqwest::header::RETRY_AFTER);

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    if status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && (exhausted || retry_after))
    {
        return Err(ForgeError::RateLimited(format!("HTTP {status}: {body}")));
    }
    Err(ForgeError::UpstreamStatus {
        status: status.as_u16(),
        body,
    })
}

// =============================================================================
// GraphQL response shapes
// =============================================================================

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Deserialize)]
struct SearchData {
    search: SearchConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchConnection {
    #[serde(default)]
    edges: Vec<SearchEdge>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct SearchEdge {
    node: Option<SearchNode>,
}

#[derive(Deserialize)]
struct SearchNode {
    url: Option<String>,
}

#[derive(Deserialize)]
struct TagsData {
    repository: Option<RepositoryRefs>,
}

#[derive(Deserialize)]
struct RepositoryRefs {
    refs: Option<RefConnection>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefConnection {
    #[serde(default)]
    nodes: Vec<RefNode>,
    page_info: PageInfo,
}

#[derive(Deserialize)]
struct RefNode {
    name: String,
    target: Option<RefTarget>,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum RefTarget {
    Commit {
        #[serde(rename = "committedDate", default, with = "time::serde::rfc3339::option")]
        committed_date: Option<OffsetDateTime>,
    },
    Tag {
        tagger: Option<Tagger>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Tagger {
    #[serde(default, with = "time::serde::rfc3339::option")]
    date: Option<OffsetDateTime>,
}

impl RefTarget {
    fn date(self) -> TagDate {
        match self {
            RefTarget::Commit { committed_date } => TagDate::resolve(committed_date, None),
            RefTarget::Tag { tagger } => TagDate::resolve(None, tagger.and_then(|t| t.date)),
            RefTarget::Other => TagDate::Unknown,
        }
    }
}
