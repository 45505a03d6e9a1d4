//! End-to-end scans against the in-memory cluster.
//!
//! These tests drive real paging: native cursors come from the store, pages
//! may be empty after filtering, and the shard layout can change between
//! pages the way a resharding or failover would change it.

#[cfg(test)]
mod tests {
    use crate::config::ScanConfig;
    use crate::cursor::ScanCursor;
    use crate::error::{Error, ErrorKind};
    use crate::options::ScanOptions;
    use crate::scan::ClusterScanner;
    use crate::testing::{even_shards, MockCluster, MockValue};
    use crate::topology::ShardDescriptor;
    use crate::types::{ObjectType, ScanCommand, ScanEntry};
    use bytes::Bytes;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    const A: &str = "10.0.0.1:6379";
    const B: &str = "10.0.0.2:6379";
    const C: &str = "10.0.0.3:6379";

    fn cluster_with_keys(owners: &[&str], count: usize) -> Arc<MockCluster> {
        let cluster = Arc::new(MockCluster::new(even_shards(owners)));
        for i in 0..count {
            cluster.insert_string(format!("key:{}", i), "v");
        }
        cluster
    }

    fn scanner_for(cluster: &Arc<MockCluster>) -> ClusterScanner {
        ClusterScanner::new(cluster.clone(), cluster.clone(), ScanConfig::default())
    }

    fn names(entries: &[ScanEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| String::from_utf8_lossy(e.name()).into_owned())
            .collect()
    }

    fn expected_keys(count: usize) -> BTreeSet<String> {
        (0..count).map(|i| format!("key:{}", i)).collect()
    }

    #[tokio::test]
    async fn test_full_scan_visits_every_key_once() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("slotscan=info")
            .try_init();

        let cluster = cluster_with_keys(&[A, B, C], 200);
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_scan(ScanOptions::new().with_count(7))
            .unwrap();
        let keys = names(&session.collect_all().await.unwrap());

        let unique: BTreeSet<String> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), 200);
        assert_eq!(unique, expected_keys(200));

        let metrics = scanner.metrics().snapshot();
        assert_eq!(metrics.shards_completed, 3);
        assert_eq!(metrics.scans_completed, 1);
        assert_eq!(metrics.entries_total, 200);
        assert_eq!(metrics.pages_total, metrics.requests_total);
        assert_eq!(metrics.routing_retries, 0);
    }

    #[tokio::test]
    async fn test_node_with_split_ranges_scanned_once() {
        let cluster = Arc::new(MockCluster::new(vec![
            ShardDescriptor::new(0, 5000, A),
            ShardDescriptor::new(5001, 10000, B),
            ShardDescriptor::new(10001, 16383, A),
        ]));
        for i in 0..100 {
            cluster.insert_string(format!("key:{}", i), "v");
        }
        let scanner = scanner_for(&cluster);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let keys = names(&session.collect_all().await.unwrap());

        let unique: BTreeSet<String> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), 100);
        assert_eq!(unique, expected_keys(100));
        assert_eq!(session.shard_count_at_start(), Some(2));

        let metrics = scanner.metrics().snapshot();
        assert_eq!(metrics.shards_completed, 2);
        assert_eq!(metrics.entries_total, 100);
    }

    #[tokio::test]
    async fn test_empty_cluster_finishes() {
        let cluster = Arc::new(MockCluster::new(even_shards(&[A, B])));
        assert!(cluster.is_empty());
        let scanner = scanner_for(&cluster);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let first = session.next_page().await.unwrap();
        assert!(first.is_empty());
        assert!(!first.done);

        let second = session.next_page().await.unwrap();
        assert!(second.is_empty());
        assert!(second.done);
    }

    #[tokio::test]
    async fn test_match_and_type_filters() {
        let cluster = cluster_with_keys(&[A, B], 50);
        for i in 0..10 {
            cluster.insert(
                format!("user:{}", i),
                MockValue::Hash(vec![(Bytes::from_static(b"name"), Bytes::from_static(b"x"))]),
            );
        }
        cluster.insert_string("user:plain", "v");
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_scan(ScanOptions::new().with_match("user:*").with_count(4))
            .unwrap();
        let users: BTreeSet<String> = names(&session.collect_all().await.unwrap())
            .into_iter()
            .collect();
        assert_eq!(users.len(), 11);
        assert!(users.iter().all(|k| k.starts_with("user:")));

        let mut session = scanner
            .start_scan(
                ScanOptions::new()
                    .with_match("user:*")
                    .with_type(ObjectType::Hash),
            )
            .unwrap();
        let hashes = names(&session.collect_all().await.unwrap());
        assert_eq!(hashes.len(), 10);
        assert!(!hashes.contains(&"user:plain".to_string()));
    }

    #[tokio::test]
    async fn test_failover_mid_scan_keeps_position() {
        let cluster = cluster_with_keys(&[A, B], 120);
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_scan(ScanOptions::new().with_count(5))
            .unwrap();
        let first = session.next_page().await.unwrap();
        assert!(!first.done);
        let mut keys = names(&first.entries);

        // Shard 0 fails over from A to C; C holds the same slots.
        cluster.set_shards(even_shards(&[C, B]));

        keys.extend(names(&session.collect_all().await.unwrap()));
        let unique: BTreeSet<String> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), 120);
        assert_eq!(unique, expected_keys(120));

        let metrics = scanner.metrics().snapshot();
        assert_eq!(metrics.routing_retries, 1);
        assert_eq!(metrics.topology_refreshes, 2);
        assert_eq!(scanner.topology().generation(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_share_topology() {
        let cluster = cluster_with_keys(&[A, B, C], 90);
        let scanner = scanner_for(&cluster);

        let mut first = scanner
            .start_scan(ScanOptions::new().with_count(3))
            .unwrap();
        let mut second = scanner
            .start_scan(ScanOptions::new().with_count(11))
            .unwrap();

        let (left, right) = tokio::join!(first.collect_all(), second.collect_all());
        let left: BTreeSet<String> = names(&left.unwrap()).into_iter().collect();
        let right: BTreeSet<String> = names(&right.unwrap()).into_iter().collect();

        assert_eq!(left, expected_keys(90));
        assert_eq!(left, right);
        assert_eq!(scanner.metrics().topology_refreshes.get(), 1);
        assert_eq!(scanner.metrics().scans_completed.get(), 2);
    }

    #[tokio::test]
    async fn test_resume_after_restart() {
        let cluster = cluster_with_keys(&[A, B], 60);
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_scan(ScanOptions::new().with_count(8))
            .unwrap();
        let mut keys = Vec::new();
        for _ in 0..3 {
            keys.extend(names(&session.next_page().await.unwrap().entries));
        }
        let token = session.cursor().to_string();
        drop(session);

        // A fresh scanner, as after a process restart.
        let scanner = scanner_for(&cluster);
        let mut resumed = scanner
            .resume_scan(ScanOptions::new().with_count(8), &ScanCursor::from(token))
            .await
            .unwrap();
        keys.extend(names(&resumed.collect_all().await.unwrap()));

        let unique: BTreeSet<String> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), 60);
        assert_eq!(unique, expected_keys(60));
    }

    #[tokio::test]
    async fn test_hscan_through_cluster() {
        let cluster = Arc::new(MockCluster::new(even_shards(&[A, B, C])));
        let fields = (0..25)
            .map(|i| {
                (
                    Bytes::from(format!("field:{}", i)),
                    Bytes::from(format!("value:{}", i)),
                )
            })
            .collect();
        cluster.insert("profile", MockValue::Hash(fields));
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_single_key_scan(ScanCommand::HScan, "profile", ScanOptions::new().with_count(10))
            .unwrap();
        let mut pages = 0;
        let mut entries = Vec::new();
        while !session.is_done() {
            entries.extend(session.next_page().await.unwrap().entries);
            pages += 1;
        }

        assert_eq!(pages, 3);
        assert_eq!(entries.len(), 25);
        assert_eq!(
            entries[0],
            ScanEntry::Pair {
                member: Bytes::from_static(b"field:0"),
                value: Bytes::from_static(b"value:0"),
            }
        );

        let mut session = scanner
            .start_single_key_scan(
                ScanCommand::HScan,
                "profile",
                ScanOptions::new().with_no_values(true),
            )
            .unwrap();
        let entries = session.collect_all().await.unwrap();
        assert_eq!(entries.len(), 25);
        assert!(entries.iter().all(|e| e.value().is_none()));
    }

    #[tokio::test]
    async fn test_zscan_scores_through_cluster() {
        let cluster = Arc::new(MockCluster::new(even_shards(&[A, B])));
        cluster.insert(
            "leaderboard",
            MockValue::ZSet(vec![
                (Bytes::from_static(b"alice"), 1.5),
                (Bytes::from_static(b"bob"), 2.0),
            ]),
        );
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_single_key_scan(ScanCommand::ZScan, "leaderboard", ScanOptions::new())
            .unwrap();
        let entries = session.collect_all().await.unwrap();

        let scores: Vec<(String, String)> = entries
            .iter()
            .map(|e| {
                (
                    String::from_utf8_lossy(e.name()).into_owned(),
                    e.value()
                        .map(|v| String::from_utf8_lossy(v).into_owned())
                        .unwrap_or_default(),
                )
            })
            .collect();
        assert_eq!(
            scores,
            vec![
                ("alice".to_string(), "1.5".to_string()),
                ("bob".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_key_scans_empty() {
        let cluster = Arc::new(MockCluster::new(even_shards(&[A])));
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_single_key_scan(ScanCommand::SScan, "missing", ScanOptions::new())
            .unwrap();
        let page = session.next_page().await.unwrap();
        assert!(page.is_empty());
        assert!(page.done);
    }

    #[tokio::test]
    async fn test_wrong_type_is_fatal() {
        let cluster = Arc::new(MockCluster::new(even_shards(&[A])));
        cluster.insert_string("plain", "v");
        let scanner = scanner_for(&cluster);

        let mut session = scanner
            .start_single_key_scan(ScanCommand::SScan, "plain", ScanOptions::new())
            .unwrap();
        let err = session.next_page().await.unwrap_err();

        assert!(matches!(err, Error::Remote(_)));
        assert!(!err.is_retryable());
        assert_eq!(scanner.metrics().routing_retries.get(), 0);
        assert_eq!(scanner.metrics().errors.get(ErrorKind::Fatal), 1);
    }

    #[tokio::test]
    async fn test_metrics_exported() {
        let cluster = cluster_with_keys(&[A], 5);
        let scanner = scanner_for(&cluster);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        session.collect_all().await.unwrap();

        let text = scanner.metrics().to_prometheus();
        assert!(text.contains("scan_pages_total 1"));
        assert!(text.contains("scan_entries_total 5"));
        assert!(text.contains("scan_request_latency_seconds_count 1"));
    }
}
