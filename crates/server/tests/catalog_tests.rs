mod common;

use common::*;
use modindex_core::{FeedEntry, INFINITE_PAST};
use modindex_metadata::MetadataError;

#[tokio::test]
async fn store_repos_inserts_new_and_ignores_existing() {
    run_metadata_test_both(|store| async move {
        assert_eq!(store.store_repos(&[]).await.unwrap(), 0);

        let inserted = store
            .store_repos(&[repo("a/b"), repo("c/d")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        store.finish_repo_lease(&repo("a/b"), Some(t0())).await.unwrap();

        // Re-listing keeps existing lease state and only adds the new repo.
        let inserted = store
            .store_repos(&[repo("a/b"), repo("e/f"), repo("e/f")])
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.count_repos().await.unwrap(), 3);

        let lease = store.get_repo_lease(&repo("a/b")).await.unwrap().unwrap();
        assert_eq!(lease.indexing_finished, t0());
        let lease = store.get_repo_lease(&repo("e/f")).await.unwrap().unwrap();
        assert_eq!(lease.indexing_began, INFINITE_PAST);
        assert_eq!(lease.indexing_finished, INFINITE_PAST);
    })
    .await;
}

#[tokio::test]
async fn store_repo_tags_replaces_full_set() {
    run_metadata_test_both(|store| async move {
        let id = repo("a/b");
        store.store_repos(std::slice::from_ref(&id)).await.unwrap();

        let first = vec![tag(&id, "A", at(1)), tag(&id, "B", at(2))];
        store.store_repo_tags(&id, &first, Some(at(10))).await.unwrap();
        assert_eq!(
            tag_names(&store.list_repo_tags(&id).await.unwrap()),
            vec!["A", "B"]
        );

        let second = vec![tag(&id, "B", at(3)), tag(&id, "C", at(4))];
        store.store_repo_tags(&id, &second, Some(at(20))).await.unwrap();

        let stored = store.list_repo_tags(&id).await.unwrap();
        assert_eq!(tag_names(&stored), vec!["B", "C"]);
        assert_eq!(stored, second);

        let lease = store.get_repo_lease(&id).await.unwrap().unwrap();
        assert_eq!(lease.indexing_finished, at(20));
    })
    .await;
}

#[tokio::test]
async fn store_repo_tags_is_idempotent() {
    run_metadata_test_both(|store| async move {
        let id = repo("a/b");
        store.store_repos(std::slice::from_ref(&id)).await.unwrap();
        let tags = vec![
            tag_with_path(&id, "v1.1.0", "vanity.example/ab", at(2)),
            tag(&id, "v1.0.0", at(1)),
        ];

        store.store_repo_tags(&id, &tags, Some(at(10))).await.unwrap();
        let once = store.list_repo_tags(&id).await.unwrap();
        let feed_once = store.fetch_feed(None, 100).await.unwrap();

        store.store_repo_tags(&id, &tags, Some(at(10))).await.unwrap();
        assert_eq!(store.list_repo_tags(&id).await.unwrap(), once);
        assert_eq!(store.fetch_feed(None, 100).await.unwrap(), feed_once);
        assert_eq!(once.len(), 2);
    })
    .await;
}

#[tokio::test]
async fn store_repo_tags_keeps_first_of_repeated_name() {
    run_metadata_test_both(|store| async move {
        let id = repo("a/b");
        store.store_repos(std::slice::from_ref(&id)).await.unwrap();
        let tags = vec![
            tag_with_path(&id, "v1.0.0", "vanity.example/ab", at(2)),
            tag(&id, "v0.9.0", at(1)),
            tag(&id, "v1.0.0", at(3)),
        ];

        store.store_repo_tags(&id, &tags, Some(at(10))).await.unwrap();

        let stored = store.list_repo_tags(&id).await.unwrap();
        assert_eq!(stored, vec![tags[1].clone(), tags[0].clone()]);
        let lease = store.get_repo_lease(&id).await.unwrap().unwrap();
        assert_eq!(lease.indexing_finished, at(10));
    })
    .await;
}

#[tokio::test]
async fn store_repo_tags_leaves_other_repos_alone() {
    run_metadata_test_both(|store| async move {
        let ab = repo("a/b");
        let cd = repo("c/d");
        store.store_repos(&[ab.clone(), cd.clone()]).await.unwrap();

        store
            .store_repo_tags(&cd, &[tag(&cd, "v0.1.0", at(1))], Some(at(5)))
            .await
            .unwrap();
        store
            .store_repo_tags(&ab, &[tag(&ab, "v1.0.0", at(2))], Some(at(6)))
            .await
            .unwrap();
        store
            .store_repo_tags(&ab, &[tag(&ab, "v2.0.0", at(3))], Some(at(7)))
            .await
            .unwrap();

        assert_eq!(
            tag_names(&store.list_repo_tags(&cd).await.unwrap()),
            vec!["v0.1.0"]
        );
        assert_eq!(
            tag_names(&store.list_repo_tags(&ab).await.unwrap()),
            vec!["v2.0.0"]
        );
    })
    .await;
}

#[tokio::test]
async fn store_repo_tags_for_unknown_repo_rolls_back() {
    run_metadata_test_both(|store| async move {
        let ghost = repo("ghost/repo");
        let result = store
            .store_repo_tags(&ghost, &[tag(&ghost, "v1.0.0", at(1))], Some(at(5)))
            .await;
        assert!(matches!(result, Err(MetadataError::NotFound(_))));
        assert!(store.list_repo_tags(&ghost).await.unwrap().is_empty());
        assert!(store.fetch_feed(None, 10).await.unwrap().is_empty());
    })
    .await;
}

#[tokio::test]
async fn feed_since_returns_nearest_qualifying_tag() {
    run_metadata_test_both(|store| async move {
        let id = repo("a/b");
        store.store_repos(std::slice::from_ref(&id)).await.unwrap();
        let (t1, t_mid, t2, t3) = (at(100), at(150), at(200), at(300));
        store
            .store_repo_tags(
                &id,
                &[
                    tag(&id, "v1.0.0", t1),
                    tag(&id, "v1.1.0", t2),
                    tag(&id, "v1.2.0", t3),
                ],
                Some(at(400)),
            )
            .await
            .unwrap();

        let entries = store.fetch_feed(Some(t_mid), 1).await.unwrap();
        assert_eq!(
            entries,
            vec![FeedEntry {
                path: "forge.test/a/b".to_string(),
                version: "v1.1.0".to_string(),
                timestamp: t2,
            }]
        );

        // Several qualifying rows come back newest first.
        let entries = store.fetch_feed(Some(t_mid), 10).await.unwrap();
        let versions: Vec<_> = entries.iter().map(|e| e.version.as_str()).collect();
        assert_eq!(versions, vec!["v1.2.0", "v1.1.0"]);

        // `since` is inclusive.
        let entries = store.fetch_feed(Some(t2), 1).await.unwrap();
        assert_eq!(entries[0].version, "v1.1.0");

        assert!(store.fetch_feed(Some(at(301)), 10).await.unwrap().is_empty());
    })
    .await;
}

#[tokio::test]
async fn feed_without_since_returns_newest_first() {
    run_metadata_test_both(|store| async move {
        let ab = repo("a/b");
        let cd = repo("c/d");
        store.store_repos(&[ab.clone(), cd.clone()]).await.unwrap();
        store
            .store_repo_tags(
                &ab,
                &[tag(&ab, "v1.0.0", at(1)), tag(&ab, "v1.1.0", at(3))],
                Some(at(10)),
            )
            .await
            .unwrap();
        store
            .store_repo_tags(
                &cd,
                &[tag_with_path(&cd, "v0.2.0", "example.com/cd", at(2))],
                Some(at(10)),
            )
            .await
            .unwrap();

        let entries = store.fetch_feed(None, 2).await.unwrap();
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.path.as_str(), e.version.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("forge.test/a/b", "v1.1.0"), ("example.com/cd", "v0.2.0")]
        );

        let all = store.fetch_feed(None, 100).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    })
    .await;
}
