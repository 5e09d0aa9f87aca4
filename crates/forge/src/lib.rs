//! Forge crawl client.
//!
//! [`ForgeTransport`] performs single requests against the forge. The
//! [`ForgeClient`] on top of it follows pagination cursors, bounds every
//! call with a timeout and resolves module paths from `go.mod`.

pub mod client;
pub mod error;
pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use client::{ForgeClient, ModuleResolution, RepoStream, TagCrawl, TagStream};
pub use error::{ForgeError, ForgeResult};
pub use http::HttpTransport;
pub use transport::{ForgeTransport, ModuleFile, Page, RepositoryNode, TagRefNode};
