//! Forge client error types.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by the forge client.
///
/// The client never retries. [`ForgeError::is_transient`] identifies the
/// errors a caller should expect to clear up after backing off.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    #[error("rate limited by forge: {0}")]
    RateLimited(String),

    #[error("forge request timed out after {0:?}")]
    Timeout(Duration),

    #[error("forge transport error: {0}")]
    Transport(String),

    #[error("forge returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("forge GraphQL error: {0}")]
    GraphQl(String),

    #[error("repository not found on forge: {0}")]
    RepoNotFound(String),

    #[error("failed to decode forge response: {0}")]
    Decode(String),

    #[error("invalid forge configuration: {0}")]
    Config(String),
}

impl ForgeError {
    /// Whether the error is a rate limit or a transient network/server fault.
    pub fn is_transient(&self) -> bool {
        match self {
            ForgeError::RateLimited(_) | ForgeError::Timeout(_) | ForgeError::Transport(_) => true,
            ForgeError::UpstreamStatus { status, .. } => *status >= 500,
            ForgeError::GraphQl(_)
            | ForgeError::RepoNotFound(_)
            | ForgeError::Decode(_)
            | ForgeError::Config(_) => false,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForgeError::RateLimited(_) => "rate_limited",
            ForgeError::Timeout(_) => "timeout",
            ForgeError::Transport(_) => "transport",
            ForgeError::UpstreamStatus { .. } => "upstream_status",
            ForgeError::GraphQl(_) => "graphql",
            ForgeError::RepoNotFound(_) => "repo_not_found",
            ForgeError::Decode(_) => "decode",
            ForgeError::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ForgeError::Decode(err.to_string())
        } else {
            ForgeError::Transport(err.to_string())
        }
    }
}

/// Result type for forge operations.
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;
