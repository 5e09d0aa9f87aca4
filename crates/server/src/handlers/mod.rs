//! HTTP request handlers.

pub mod feed;
pub mod health;

pub use feed::*;
pub use health::*;
