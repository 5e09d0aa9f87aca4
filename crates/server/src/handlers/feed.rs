//! Module version feed.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use modindex_core::feed::render_lines;
use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Content type of the feed body: one JSON object per line.
pub const FEED_CONTENT_TYPE: &str = "application/x-ndjson";

/// Feed query parameters. Empty values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    /// RFC 3339 lower bound on tag creation time.
    pub since: Option<String>,
    /// Maximum number of entries.
    pub limit: Option<String>,
}

impl FeedParams {
    fn since(&self) -> ApiResult<Option<OffsetDateTime>> {
        match self.since.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => OffsetDateTime::parse(raw, &Rfc3339)
                .map(Some)
                .map_err(|e| ApiError::BadRequest(format!("invalid since {raw:?}: {e}"))),
        }
    }

    fn limit(&self, default: i64) -> ApiResult<i64> {
        let limit = match self.limit.as_deref() {
            None | Some("") => default,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| ApiError::BadRequest(format!("invalid limit {raw:?}: {e}")))?,
        };
        if limit <= 0 {
            return Err(ApiError::BadRequest(format!(
                "limit must be positive, got {limit}"
            )));
        }
        Ok(limit)
    }
}

/// GET / and GET /index
pub async fn get_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> ApiResult<impl IntoResponse> {
    let since = params.since()?;
    let limit = params.limit(state.config.server.default_feed_limit)?;

    let entries = state.metadata.fetch_feed(since, limit).await?;
    let body = render_lines(&entries)
        .map_err(|e| ApiError::Internal(format!("failed to encode feed: {e}")))?;

    tracing::debug!(count = entries.len(), since = ?since, limit, "Served feed");

    Ok(([(header::CONTENT_TYPE, FEED_CONTENT_TYPE)], body))
}
