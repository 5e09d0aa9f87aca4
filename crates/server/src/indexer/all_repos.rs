//! Reindex-all-repos loop.

use super::{Backoff, IndexerError, sleep_or_cancel};
use crate::metrics;
use futures::TryStreamExt;
use modindex_core::RepoId;
use modindex_core::config::{BackoffConfig, IndexingConfig};
use modindex_forge::{ForgeClient, ForgeError};
use modindex_metadata::MetadataStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of one lease attempt.
#[derive(Debug)]
pub enum AllReposOutcome {
    /// Another holder has the lease, or the list is fresh enough.
    LeaseUnavailable,
    /// The repository list was crawled and stored.
    Indexed { listed: usize, inserted: u64 },
    /// The crawl failed; the loop backs off and retries the lease.
    ForgeFailed(ForgeError),
    /// Cancelled while crawling.
    Cancelled,
}

/// Periodically re-crawls the forge's repository list under the global lease.
pub struct AllReposLoop {
    store: Arc<dyn MetadataStore>,
    forge: ForgeClient,
    ttl: Duration,
    period: Duration,
    check_period: Duration,
    backoff_config: BackoffConfig,
    backoff: Backoff,
}

impl AllReposLoop {
    pub fn new(store: Arc<dyn MetadataStore>, forge: ForgeClient, config: &IndexingConfig) -> Self {
        Self {
            store,
            forge,
            ttl: config.all_repos_reindex_ttl(),
            period: config.all_repos_reindex_period(),
            check_period: config.all_repos_work_check_period(),
            backoff_config: config.backoff.clone(),
            backoff: Backoff::from_config(&config.backoff),
        }
    }

    /// Loop until cancelled. Only metadata store failures end it early.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), IndexerError> {
        while !token.is_cancelled() {
            let wait = match self.run_once(&token).await? {
                AllReposOutcome::LeaseUnavailable | AllReposOutcome::Indexed { .. } => {
                    self.check_period
                }
                AllReposOutcome::ForgeFailed(e) => {
                    let wait = self.backoff.pause();
                    metrics::BACKOFF_WAITS.inc();
                    log_forge_error(&e, wait);
                    wait
                }
                AllReposOutcome::Cancelled => break,
            };
            if !sleep_or_cancel(&token, wait).await {
                break;
            }
        }

        tracing::debug!("Repository list loop stopped");
        Ok(())
    }

    /// Attempt the global lease and, if acquired, crawl and store the list.
    pub async fn run_once(
        &mut self,
        token: &CancellationToken,
    ) -> Result<AllReposOutcome, IndexerError> {
        let acquired = self
            .store
            .try_acquire_global_lease(self.ttl, self.period, None)
            .await?;
        if !acquired {
            tracing::trace!("Repository list lease not available");
            return Ok(AllReposOutcome::LeaseUnavailable);
        }
        metrics::GLOBAL_LEASE_ACQUIRED.inc();
        tracing::info!("Acquired repository list lease, crawling forge");

        let crawl = self.forge.list_repositories().try_collect::<Vec<RepoId>>();
        let repos = tokio::select! {
            _ = token.cancelled() => return Ok(AllReposOutcome::Cancelled),
            result = crawl => result,
        };
        let repos = match repos {
            Ok(repos) => repos,
            Err(e) => {
                metrics::record_forge_error("list_repositories");
                return Ok(AllReposOutcome::ForgeFailed(e));
            }
        };

        let inserted = self.store.store_repos(&repos).await?;
        self.store.finish_global_lease(None).await?;
        metrics::REPOS_DISCOVERED.inc_by(inserted);
        self.backoff = Backoff::from_config(&self.backoff_config);

        tracing::info!(
            listed = repos.len(),
            inserted,
            "Repository list crawl finished"
        );
        Ok(AllReposOutcome::Indexed {
            listed: repos.len(),
            inserted,
        })
    }
}

fn log_forge_error(e: &ForgeError, wait: Duration) {
    let delay_ms = wait.as_millis() as u64;
    if e.is_transient() {
        tracing::warn!(
            error = %e,
            kind = e.kind(),
            delay_ms,
            "Repository list crawl failed, backing off"
        );
    } else {
        tracing::error!(
            error = %e,
            kind = e.kind(),
            delay_ms,
            "Repository list crawl failed, backing off"
        );
    }
}
