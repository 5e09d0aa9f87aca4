//! Module indexer daemon.
//!
//! This crate provides:
//! - The reindex-all-repos loop and the tag-reindex worker pool
//! - The backoff controller shared by both
//! - The HTTP feed, health and metrics endpoints

pub mod error;
pub mod handlers;
pub mod indexer;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use indexer::{IndexerError, run_indexers};
pub use routes::create_router;
pub use state::AppState;
