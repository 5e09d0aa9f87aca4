//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid repository id: {0}")]
    InvalidRepoId(String),

    #[error("invalid module path: {0}")]
    InvalidModulePath(String),

    #[error("go.mod parse error: {0}")]
    ModFileParse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
