//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
///
/// Every variant is treated as fatal by the indexing loops: a failed lease
/// or catalog write may mean mutual exclusion can no longer be trusted.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

impl From<modindex_core::Error> for MetadataError {
    fn from(err: modindex_core::Error) -> Self {
        MetadataError::CorruptRow(err.to_string())
    }
}
