//! Crawl scheduling.
//!
//! One [`AllReposLoop`] and `repo_tags_workers` [`RepoTagsWorker`]s run per
//! process. They share nothing in memory: every coordination decision is a
//! lease acquisition against the metadata store, so any number of processes
//! can run the same task set side by side.

pub mod all_repos;
pub mod backoff;
pub mod repo_tags;

pub use all_repos::{AllReposLoop, AllReposOutcome};
pub use backoff::Backoff;
pub use repo_tags::{RepoTagsOutcome, RepoTagsWorker};

use modindex_core::config::IndexingConfig;
use modindex_forge::ForgeClient;
use modindex_metadata::{MetadataError, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Errors that terminate an indexer task.
///
/// Forge failures never appear here: both loops recover from them by
/// backing off.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("metadata store failure: {0}")]
    Metadata(#[from] MetadataError),

    #[error("indexer task aborted: {0}")]
    Join(String),
}

/// Sleep for `duration` unless `token` is cancelled first.
///
/// Returns `false` if the sleep was cut short by cancellation.
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Run the repository-list loop and the tag worker pool until `token` is
/// cancelled or a task fails.
///
/// The first failing task cancels `token`, the remaining tasks are drained,
/// and that first error is returned.
pub async fn run_indexers(
    store: Arc<dyn MetadataStore>,
    forge: ForgeClient,
    config: &IndexingConfig,
    token: CancellationToken,
) -> Result<(), IndexerError> {
    let mut tasks = JoinSet::new();

    tasks.spawn(AllReposLoop::new(store.clone(), forge.clone(), config).run(token.clone()));
    for worker_id in 0..config.repo_tags_workers {
        tasks.spawn(
            RepoTagsWorker::new(worker_id, store.clone(), forge.clone(), config).run(token.clone()),
        );
    }

    tracing::info!(
        workers = config.repo_tags_workers,
        "Indexer tasks started"
    );

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined
            .map_err(|e| IndexerError::Join(e.to_string()))
            .and_then(|r| r);
        if let Err(e) = result {
            if first_error.is_none() {
                tracing::error!(error = %e, "Indexer task failed, cancelling remaining tasks");
                token.cancel();
                first_error = Some(e);
            } else {
                tracing::warn!(error = %e, "Additional indexer task failure during shutdown");
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            tracing::info!("Indexer tasks stopped");
            Ok(())
        }
    }
}
