//! Tag-reindex worker.

use super::{Backoff, IndexerError, sleep_or_cancel};
use crate::metrics;
use modindex_core::RepoId;
use modindex_core::config::{BackoffConfig, IndexingConfig};
use modindex_forge::{ForgeClient, ForgeError};
use modindex_metadata::MetadataStore;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Result of one lease attempt.
#[derive(Debug)]
pub enum RepoTagsOutcome {
    /// No repository is due for a crawl.
    NoWork,
    /// The repository's tags were crawled and its tag set replaced.
    Indexed {
        repo_id: RepoId,
        stored: usize,
        skipped: usize,
    },
    /// The crawl found no tags; the lease was finished and stored tags kept.
    Empty { repo_id: RepoId },
    /// The forge no longer knows the repository; treated like an empty crawl.
    Gone { repo_id: RepoId },
    /// The crawl failed; the worker backs off and the lease lapses after its TTL.
    ForgeFailed { repo_id: RepoId, error: ForgeError },
    /// Cancelled while crawling.
    Cancelled,
}

/// One member of the tag worker pool.
pub struct RepoTagsWorker {
    worker_id: usize,
    store: Arc<dyn MetadataStore>,
    forge: ForgeClient,
    ttl: Duration,
    period: Duration,
    check_period: Duration,
    jitter: (Duration, Duration),
    backoff_config: BackoffConfig,
    backoff: Backoff,
}

impl RepoTagsWorker {
    pub fn new(
        worker_id: usize,
        store: Arc<dyn MetadataStore>,
        forge: ForgeClient,
        config: &IndexingConfig,
    ) -> Self {
        Self {
            worker_id,
            store,
            forge,
            ttl: config.repo_tags_reindex_ttl(),
            period: config.repo_tags_reindex_period(),
            check_period: config.repo_tags_work_check_period(),
            jitter: config.repo_tags_jitter(),
            backoff_config: config.backoff.clone(),
            backoff: Backoff::from_config(&config.backoff),
        }
    }

    /// Loop until cancelled. Only metadata store failures end it early.
    pub async fn run(mut self, token: CancellationToken) -> Result<(), IndexerError> {
        while !token.is_cancelled() {
            let wait = match self.run_once(&token).await? {
                RepoTagsOutcome::NoWork => self.idle_wait(),
                RepoTagsOutcome::Indexed { .. }
                | RepoTagsOutcome::Empty { .. }
                | RepoTagsOutcome::Gone { .. } => continue,
                RepoTagsOutcome::ForgeFailed { repo_id, error } => {
                    let wait = self.backoff.pause();
                    metrics::BACKOFF_WAITS.inc();
                    let delay_ms = wait.as_millis() as u64;
                    if error.is_transient() {
                        tracing::warn!(
                            worker = self.worker_id,
                            repo_id = %repo_id,
                            error = %error,
                            kind = error.kind(),
                            delay_ms,
                            "Tag crawl failed, backing off"
                        );
                    } else {
                        tracing::error!(
                            worker = self.worker_id,
                            repo_id = %repo_id,
                            error = %error,
                            kind = error.kind(),
                            delay_ms,
                            "Tag crawl failed, backing off"
                        );
                    }
                    wait
                }
                RepoTagsOutcome::Cancelled => break,
            };
            if !sleep_or_cancel(&token, wait).await {
                break;
            }
        }

        tracing::debug!(worker = self.worker_id, "Tag worker stopped");
        Ok(())
    }

    fn idle_wait(&self) -> Duration {
        jittered_wait(self.check_period, self.jitter)
    }

    /// Attempt a repository lease and, if acquired, crawl and store its tags.
    pub async fn run_once(
        &mut self,
        token: &CancellationToken,
    ) -> Result<RepoTagsOutcome, IndexerError> {
        let Some(repo_id) = self
            .store
            .try_acquire_repo_lease(self.ttl, self.period, None)
            .await?
        else {
            return Ok(RepoTagsOutcome::NoWork);
        };
        metrics::REPO_LEASE_ACQUIRED.inc();
        tracing::debug!(
            worker = self.worker_id,
            repo_id = %repo_id,
            "Acquired repository lease"
        );

        let started = Instant::now();
        metrics::ACTIVE_CRAWLS.inc();
        let crawl = tokio::select! {
            _ = token.cancelled() => None,
            result = self.forge.crawl_tags(&repo_id) => Some(result),
        };
        metrics::ACTIVE_CRAWLS.dec();

        let crawl = match crawl {
            None => return Ok(RepoTagsOutcome::Cancelled),
            Some(Ok(crawl)) => crawl,
            Some(Err(ForgeError::RepoNotFound(reason))) => {
                tracing::warn!(
                    worker = self.worker_id,
                    repo_id = %repo_id,
                    reason = %reason,
                    "Repository no longer on forge, keeping stored tags"
                );
                self.store.finish_repo_lease(&repo_id, None).await?;
                return Ok(RepoTagsOutcome::Gone { repo_id });
            }
            Some(Err(error)) => {
                metrics::record_forge_error("crawl_tags");
                return Ok(RepoTagsOutcome::ForgeFailed { repo_id, error });
            }
        };
        metrics::CRAWL_DURATION.observe(started.elapsed().as_secs_f64());
        metrics::record_tags_skipped("unresolvable", crawl.skipped);
        metrics::record_tags_skipped("undated", crawl.undated);

        let outcome = if crawl.tags.is_empty() {
            self.store.finish_repo_lease(&repo_id, None).await?;
            tracing::info!(
                worker = self.worker_id,
                repo_id = %repo_id,
                skipped = crawl.skipped,
                "Repository has no indexable tags"
            );
            RepoTagsOutcome::Empty { repo_id }
        } else {
            self.store.store_repo_tags(&repo_id, &crawl.tags, None).await?;
            metrics::TAGS_STORED.inc_by(crawl.tags.len() as u64);
            tracing::info!(
                worker = self.worker_id,
                repo_id = %repo_id,
                stored = crawl.tags.len(),
                skipped = crawl.skipped,
                undated = crawl.undated,
                "Stored repository tags"
            );
            RepoTagsOutcome::Indexed {
                repo_id,
                stored: crawl.tags.len(),
                skipped: crawl.skipped,
            }
        };

        metrics::REPOS_INDEXED.inc();
        self.backoff = Backoff::from_config(&self.backoff_config);
        Ok(outcome)
    }
}

/// Idle wait: `base` plus a uniform jitter drawn from the inclusive range.
fn jittered_wait(base: Duration, (min, max): (Duration, Duration)) -> Duration {
    let jitter = if min < max {
        rand::rng().random_range(min..=max)
    } else {
        min
    };
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use modindex_core::config::AppConfig;
    use modindex_core::{INFINITE_PAST, TagDate};
    use modindex_forge::TagRefNode;
    use modindex_forge::testing::ScriptedTransport;
    use modindex_metadata::SqliteStore;
    use time::macros::datetime;

    async fn setup(
        transport: ScriptedTransport,
        repos: &[&str],
    ) -> (tempfile::TempDir, Arc<dyn MetadataStore>, RepoTagsWorker) {
        let temp = tempfile::tempdir().unwrap();
        let store: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("modindex.db"), None)
                .await
                .unwrap(),
        );
        let ids: Vec<RepoId> = repos.iter().map(|r| RepoId::parse(r).unwrap()).collect();
        store.store_repos(&ids).await.unwrap();

        let config = AppConfig::for_testing();
        let forge = ForgeClient::new(Arc::new(transport), &config.forge);
        let worker = RepoTagsWorker::new(0, store.clone(), forge, &config.indexing);
        (temp, store, worker)
    }

    fn tag(name: &str, date: TagDate) -> TagRefNode {
        TagRefNode {
            name: name.to_string(),
            date,
        }
    }

    #[tokio::test]
    async fn test_crawl_stores_tags_and_finishes_lease() {
        let transport = ScriptedTransport::new()
            .with_tag_pages(
                "a/b",
                vec![vec![
                    tag("v1.1.0", TagDate::Commit(datetime!(2025-02-01 00:00 UTC))),
                    tag("v1.0.0", TagDate::Tagger(datetime!(2025-01-01 00:00 UTC))),
                ]],
            )
            .with_module_file("a/b", "v1.1.0", "module vanity.example/ab\n");
        let (_temp, store, mut worker) = setup(transport, &["a/b"]).await;
        let repo = RepoId::parse("a/b").unwrap();

        let outcome = worker.run_once(&CancellationToken::new()).await.unwrap();
        assert!(matches!(
            outcome,
            RepoTagsOutcome::Indexed {
                stored: 2,
                skipped: 0,
                ..
            }
        ));

        let tags = store.list_repo_tags(&repo).await.unwrap();
        let summary: Vec<(&str, &str)> = tags
            .iter()
            .map(|t| (t.tag_name.as_str(), t.module_path.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("v1.0.0", "forge.test/a/b"),
                ("v1.1.0", "vanity.example/ab")
            ]
        );

        let lease = store.get_repo_lease(&repo).await.unwrap().unwrap();
        assert!(lease.indexing_finished >= lease.indexing_began);

        // Freshly finished, so nothing is due.
        let outcome = worker.run_once(&CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, RepoTagsOutcome::NoWork));
    }

    #[tokio::test]
    async fn test_zero_tags_finishes_lease() {
        let (_temp, store, mut worker) = setup(ScriptedTransport::new(), &["a/b"]).await;
        let repo = RepoId::parse("a/b").unwrap();

        let outcome = worker.run_once(&CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, RepoTagsOutcome::Empty { .. }));

        let lease = store.get_repo_lease(&repo).await.unwrap().unwrap();
        assert_ne!(lease.indexing_finished, INFINITE_PAST);
        assert!(store.list_repo_tags(&repo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forge_error_leaves_lease_to_expire() {
        let transport = ScriptedTransport::new()
            .with_tag_pages("a/b", vec![vec![tag("v1.0.0", TagDate::Unknown)]])
            .fail_tags("a/b", ForgeError::Timeout(Duration::from_secs(10)));
        let (_temp, store, mut worker) = setup(transport, &["a/b"]).await;
        let repo = RepoId::parse("a/b").unwrap();

        let outcome = worker.run_once(&CancellationToken::new()).await.unwrap();
        assert!(matches!(
            outcome,
            RepoTagsOutcome::ForgeFailed {
                error: ForgeError::Timeout(_),
                ..
            }
        ));

        let lease = store.get_repo_lease(&repo).await.unwrap().unwrap();
        assert_eq!(lease.indexing_finished, INFINITE_PAST);
        assert!(lease.indexing_began > INFINITE_PAST);
        assert!(store.list_repo_tags(&repo).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_repository_keeps_existing_tags() {
        let transport = ScriptedTransport::new()
            .with_tag_pages("a/b", vec![vec![tag("v1.0.0", TagDate::Unknown)]]);
        let (_temp, store, mut worker) = setup(transport, &["a/b"]).await;
        let repo = RepoId::parse("a/b").unwrap();
        let tags = vec![modindex_core::RepoTag::new(
            repo.clone(),
            "v0.9.0",
            modindex_core::ModulePath::from_forge("forge.test", &repo),
            TagDate::Unknown,
        )];
        store
            .store_repo_tags(&repo, &tags, Some(INFINITE_PAST))
            .await
            .unwrap();

        // Swap in a transport whose repository lookup fails.
        let config = AppConfig::for_testing();
        let transport = ScriptedTransport::new()
            .fail_tags("a/b", ForgeError::RepoNotFound("a/b".into()));
        worker.forge = ForgeClient::new(Arc::new(transport), &config.forge);

        let outcome = worker.run_once(&CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, RepoTagsOutcome::Gone { .. }));
        assert_eq!(store.list_repo_tags(&repo).await.unwrap().len(), 1);
        let lease = store.get_repo_lease(&repo).await.unwrap().unwrap();
        assert_ne!(lease.indexing_finished, INFINITE_PAST);
    }

    #[test]
    fn test_jittered_wait_bounds() {
        let base = Duration::from_secs(300);
        let jitter = (Duration::from_secs(1), Duration::from_secs(60));
        let mut distinct = std::collections::HashSet::new();
        for _ in 0..200 {
            let wait = jittered_wait(base, jitter);
            assert!(wait >= Duration::from_secs(301) && wait <= Duration::from_secs(360));
            distinct.insert(wait);
        }
        assert!(distinct.len() > 1);

        let fixed = (Duration::from_secs(5), Duration::from_secs(5));
        assert_eq!(jittered_wait(base, fixed), Duration::from_secs(305));
    }
}
