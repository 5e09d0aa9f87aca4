//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8081").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Number of feed entries returned when the request gives no `limit`.
    #[serde(default = "default_feed_limit")]
    pub default_feed_limit: i64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8081".to_string()
}

fn default_feed_limit() -> i64 {
    2000
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_feed_limit: default_feed_limit(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_feed_limit <= 0 {
            return Err("server.default_feed_limit must be positive".to_string());
        }
        Ok(())
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single instance or testing only; leases are only
    /// shared by processes that open the same file).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Busy timeout in seconds while waiting for the write lock.
        #[serde(default = "default_sqlite_busy_timeout_secs")]
        busy_timeout_secs: Option<u64>,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL (optional if using individual fields).
        /// Takes precedence over individual fields if both are provided.
        url: Option<String>,
        /// Database host (e.g., "localhost" or "db.example.com").
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// Prefer MODINDEX_METADATA__PASSWORD over storing it in the file.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    20 // one per tag worker plus headroom for the feed
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(30000) // 30 seconds
}

fn default_sqlite_busy_timeout_secs() -> Option<u64> {
    Some(5)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/modindex.db"),
            busy_timeout_secs: default_sqlite_busy_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields"
                        .to_string(),
                ),
            },
        }
    }
}

/// Scheme used to fetch raw files from the forge.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RawScheme {
    Http,
    #[default]
    Https,
}

impl RawScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            RawScheme::Http => "http",
            RawScheme::Https => "https",
        }
    }
}

/// Forge (git host) configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Forge host name, e.g. "git.example.com". Required.
    #[serde(default)]
    pub host_name: String,
    /// API token. Required.
    #[serde(default)]
    pub auth_token: String,
    /// Scheme for raw `go.mod` fetches.
    #[serde(default)]
    pub raw_scheme: RawScheme,
    /// GraphQL endpoint override. Defaults to `https://{host_name}/api/graphql`.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Repository search filter.
    #[serde(default = "default_search_query")]
    pub search_query: String,
    /// Items requested per page (1..=100).
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Timeout applied to every forge request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_search_query() -> String {
    "language:golang".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl ForgeConfig {
    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// GraphQL endpoint URL.
    pub fn graphql_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/api/graphql", self.host_name))
    }

    /// Base URL for raw file fetches.
    pub fn raw_base_url(&self) -> String {
        format!("{}://{}", self.raw_scheme.as_str(), self.host_name)
    }

    /// Prefix stripped from repository URLs to obtain `org/name`.
    pub fn repo_url_prefix(&self) -> String {
        format!("https://{}/", self.host_name)
    }

    /// Validate forge configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.host_name.trim().is_empty() {
            return Err("forge.host_name is required".to_string());
        }
        if self.auth_token.trim().is_empty() {
            return Err("forge.auth_token is required".to_string());
        }
        if !(1..=100).contains(&self.page_size) {
            return Err(format!(
                "forge.page_size must be between 1 and 100, got {}",
                self.page_size
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err("forge.request_timeout_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Exponential backoff settings for upstream errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// First delay ceiling in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    /// Largest delay ceiling in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    /// Growth factor per consecutive failure (> 1).
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

fn default_backoff_initial_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_backoff_max_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

impl BackoffConfig {
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Validate backoff settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_ms == 0 {
            return Err("indexing.backoff.initial_ms cannot be 0".to_string());
        }
        if self.max_ms < self.initial_ms {
            return Err("indexing.backoff.max_ms must be >= initial_ms".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier <= 1.0 {
            return Err(format!(
                "indexing.backoff.multiplier must be a finite value > 1, got {}",
                self.multiplier
            ));
        }
        Ok(())
    }
}

/// Lease and worker settings for the indexing loops.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// How long a holder of the repository-list lease is trusted without finishing.
    #[serde(default = "default_all_repos_reindex_ttl_secs")]
    pub all_repos_reindex_ttl_secs: u64,
    /// Minimum time between repository-list crawls.
    #[serde(default = "default_all_repos_reindex_period_secs")]
    pub all_repos_reindex_period_secs: u64,
    /// How often the repository-list loop polls for its lease.
    #[serde(default = "default_work_check_period_secs")]
    pub all_repos_work_check_period_secs: u64,
    /// How long a holder of a repository lease is trusted without finishing.
    #[serde(default = "default_repo_tags_reindex_ttl_secs")]
    pub repo_tags_reindex_ttl_secs: u64,
    /// Minimum time between tag crawls of one repository.
    #[serde(default = "default_repo_tags_reindex_period_secs")]
    pub repo_tags_reindex_period_secs: u64,
    /// Base idle wait for a tag worker that found no work.
    /// Only applies when no work is found; after a crawl the worker re-polls at once.
    #[serde(default = "default_work_check_period_secs")]
    pub repo_tags_work_check_period_secs: u64,
    /// Lower bound of the jitter added to the tag worker idle wait.
    #[serde(default = "default_jitter_min_secs")]
    pub repo_tags_jitter_min_secs: u64,
    /// Upper bound of the jitter added to the tag worker idle wait.
    #[serde(default = "default_jitter_max_secs")]
    pub repo_tags_jitter_max_secs: u64,
    /// Number of concurrent tag workers.
    #[serde(default = "default_repo_tags_workers")]
    pub repo_tags_workers: usize,
    /// Upstream error backoff.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_all_repos_reindex_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_all_repos_reindex_period_secs() -> u64 {
    86400 // 24 hours
}

fn default_work_check_period_secs() -> u64 {
    300 // 5 minutes
}

fn default_repo_tags_reindex_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_repo_tags_reindex_period_secs() -> u64 {
    86400 // 24 hours
}

fn default_jitter_min_secs() -> u64 {
    1
}

fn default_jitter_max_secs() -> u64 {
    60
}

fn default_repo_tags_workers() -> usize {
    10
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            all_repos_reindex_ttl_secs: default_all_repos_reindex_ttl_secs(),
            all_repos_reindex_period_secs: default_all_repos_reindex_period_secs(),
            all_repos_work_check_period_secs: default_work_check_period_secs(),
            repo_tags_reindex_ttl_secs: default_repo_tags_reindex_ttl_secs(),
            repo_tags_reindex_period_secs: default_repo_tags_reindex_period_secs(),
            repo_tags_work_check_period_secs: default_work_check_period_secs(),
            repo_tags_jitter_min_secs: default_jitter_min_secs(),
            repo_tags_jitter_max_secs: default_jitter_max_secs(),
            repo_tags_workers: default_repo_tags_workers(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl IndexingConfig {
    pub fn all_repos_reindex_ttl(&self) -> Duration {
        Duration::from_secs(self.all_repos_reindex_ttl_secs)
    }

    pub fn all_repos_reindex_period(&self) -> Duration {
        Duration::from_secs(self.all_repos_reindex_period_secs)
    }

    pub fn all_repos_work_check_period(&self) -> Duration {
        Duration::from_secs(self.all_repos_work_check_period_secs)
    }

    pub fn repo_tags_reindex_ttl(&self) -> Duration {
        Duration::from_secs(self.repo_tags_reindex_ttl_secs)
    }

    pub fn repo_tags_reindex_period(&self) -> Duration {
        Duration::from_secs(self.repo_tags_reindex_period_secs)
    }

    pub fn repo_tags_work_check_period(&self) -> Duration {
        Duration::from_secs(self.repo_tags_work_check_period_secs)
    }

    /// Inclusive jitter range for the tag worker idle wait.
    pub fn repo_tags_jitter(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.repo_tags_jitter_min_secs),
            Duration::from_secs(self.repo_tags_jitter_max_secs),
        )
    }

    /// Validate indexing configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.repo_tags_workers == 0 {
            return Err("indexing.repo_tags_workers must be at least 1".to_string());
        }
        if self.repo_tags_jitter_min_secs > self.repo_tags_jitter_max_secs {
            return Err(format!(
                "indexing.repo_tags_jitter_min_secs ({}) exceeds repo_tags_jitter_max_secs ({})",
                self.repo_tags_jitter_min_secs, self.repo_tags_jitter_max_secs
            ));
        }
        if self.all_repos_reindex_ttl_secs == 0 || self.repo_tags_reindex_ttl_secs == 0 {
            return Err("lease TTLs cannot be 0".to_string());
        }
        self.backoff.validate()
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Forge configuration (host and token are required).
    pub forge: ForgeConfig,
    /// Indexing loop configuration.
    #[serde(default)]
    pub indexing: IndexingConfig,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses SQLite metadata and a dummy forge host/token.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            metadata: MetadataConfig::default(),
            forge: ForgeConfig {
                host_name: "forge.test".to_string(),
                auth_token: "test-token".to_string(),
                raw_scheme: RawScheme::Https,
                api_url: None,
                search_query: default_search_query(),
                page_size: default_page_size(),
                request_timeout_secs: default_request_timeout_secs(),
            },
            indexing: IndexingConfig::default(),
        }
    }

    /// Validate every section, returning the first error.
    pub fn validate(&self) -> crate::Result<()> {
        self.server
            .validate()
            .and_then(|_| self.metadata.validate())
            .and_then(|_| self.forge.validate())
            .and_then(|_| self.indexing.validate())
            .map_err(crate::Error::Config)
    }
}
