//! Feed entries served to downstream consumers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One line of the catalog feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Timestamp", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Render entries as newline-separated JSON objects, with no trailing newline.
pub fn render_lines(entries: &[FeedEntry]) -> serde_json::Result<String> {
    let lines = entries
        .iter()
        .map(serde_json::to_string)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}
