//! Core domain types and shared logic for the module indexer.
//!
//! This crate defines the data model used across all other crates:
//! - Repository identifiers (`org/name`)
//! - Tags and their effective dates
//! - Module paths and `go.mod` module directives
//! - Feed entries served to downstream consumers
//! - Configuration types

pub mod config;
pub mod error;
pub mod feed;
pub mod module_path;
pub mod repo;
pub mod tag;

pub use error::{Error, Result};
pub use feed::FeedEntry;
pub use module_path::{ModuleDeclaration, ModulePath};
pub use repo::RepoId;
pub use tag::{RepoTag, TagDate};

/// Earliest representable instant, used as the "never" value for lease timestamps.
pub const INFINITE_PAST: time::OffsetDateTime = time::macros::datetime!(0001-01-01 00:00 UTC);
