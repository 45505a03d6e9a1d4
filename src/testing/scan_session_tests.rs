//! Keyspace scan state machine tests against scripted replies.

#[cfg(test)]
mod tests {
    use crate::config::ScanConfig;
    use crate::cursor::{ScanCursor, ShardCursorCodec, ShardCursorState};
    use crate::error::{Error, ErrorKind};
    use crate::options::ScanOptions;
    use crate::scan::{ClusterScanner, SessionState};
    use crate::testing::{even_shards, MockExecutor, MockTopologySource};
    use crate::types::{ObjectType, ScanCommand, ScanEntry};
    use bytes::Bytes;
    use std::sync::Arc;

    const A: &str = "10.0.0.1:6379";
    const B: &str = "10.0.0.2:6379";
    const C: &str = "10.0.0.3:6379";

    fn scanner(
        owners: &[&str],
    ) -> (ClusterScanner, Arc<MockExecutor>, Arc<MockTopologySource>) {
        let executor = Arc::new(MockExecutor::new());
        let source = Arc::new(MockTopologySource::new(even_shards(owners)));
        let scanner = ClusterScanner::new(executor.clone(), source.clone(), ScanConfig::default());
        (scanner, executor, source)
    }

    fn keys(entries: &[ScanEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| String::from_utf8_lossy(e.name()).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_three_shard_scenario() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("slotscan=debug")
            .try_init();

        let (scanner, executor, _) = scanner(&[A, B, C]);
        executor.push_reply(A, "7", &["a", "b"]);
        executor.push_reply(A, "0", &[]);
        executor.push_reply(B, "0", &["c"]);
        executor.push_reply(C, "0", &[]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        assert_eq!(session.state(), SessionState::NotStarted);
        assert!(session.cursor().is_initial());

        let page1 = session.next_page().await.unwrap();
        assert_eq!(keys(&page1.entries), vec!["a", "b"]);
        assert!(!page1.done);
        assert_eq!(
            ShardCursorCodec::decode(&page1.cursor, 3).unwrap(),
            ShardCursorState::new(0, 7)
        );

        let page2 = session.next_page().await.unwrap();
        assert!(page2.entries.is_empty());
        assert!(!page2.done);
        assert_eq!(
            ShardCursorCodec::decode(&page2.cursor, 3).unwrap(),
            ShardCursorState::start_of(1)
        );

        let page3 = session.next_page().await.unwrap();
        assert_eq!(keys(&page3.entries), vec!["c"]);
        assert!(!page3.done);
        assert_eq!(
            ShardCursorCodec::decode(&page3.cursor, 3).unwrap(),
            ShardCursorState::start_of(2)
        );

        let page4 = session.next_page().await.unwrap();
        assert!(page4.entries.is_empty());
        assert!(page4.done);
        assert!(page4.cursor.is_finished());
        assert!(session.is_done());

        // Native cursors reach the right nodes.
        let calls = executor.calls();
        let sent: Vec<(String, String)> = calls
            .iter()
            .map(|c| (c.node.to_string(), c.args_lossy()[0].clone()))
            .collect();
        assert_eq!(
            sent,
            vec![
                (A.to_string(), "0".to_string()),
                (A.to_string(), "7".to_string()),
                (B.to_string(), "0".to_string()),
                (C.to_string(), "0".to_string()),
            ]
        );
        assert_eq!(executor.pending(), 0);
        assert_eq!(session.shard_count_at_start(), Some(3));
    }

    #[tokio::test]
    async fn test_pages_equal_primitive_calls() {
        // Shard 0 needs two calls, shard 1 one.
        let (scanner, executor, _) = scanner(&[A, B]);
        executor.push_reply(A, "3", &["a1"]);
        executor.push_reply(A, "0", &["a2"]);
        executor.push_reply(B, "0", &["b1"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let mut pages = Vec::new();
        loop {
            let page = session.next_page().await.unwrap();
            let done = page.done;
            pages.push(page);
            if done {
                break;
            }
        }

        assert_eq!(pages.len(), 3);
        assert_eq!(pages.len(), executor.call_count());
        assert_eq!(pages.iter().filter(|p| p.done).count(), 1);
        assert!(pages.last().unwrap().done);
    }

    #[tokio::test]
    async fn test_completed_is_idempotent() {
        let (scanner, executor, _) = scanner(&[A]);
        executor.push_reply(A, "0", &["k"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        assert!(session.next_page().await.unwrap().done);

        for _ in 0..3 {
            let page = session.next_page().await.unwrap();
            assert!(page.done);
            assert!(page.entries.is_empty());
            assert!(page.cursor.is_finished());
        }
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_options_encoded_every_page() {
        let (scanner, executor, _) = scanner(&[A]);
        executor.push_reply(A, "9", &[]);
        executor.push_reply(A, "0", &[]);

        let options = ScanOptions::new()
            .with_match("user:*")
            .with_count(50)
            .with_type(ObjectType::Hash);
        let mut session = scanner.start_scan(options).unwrap();
        session.collect_all().await.unwrap();

        let calls = executor.calls();
        assert_eq!(calls.len(), 2);
        for (call, cursor) in calls.iter().zip(["0", "9"]) {
            assert_eq!(call.command, ScanCommand::Scan);
            assert_eq!(
                call.args_lossy(),
                vec![cursor, "MATCH", "user:*", "COUNT", "50", "TYPE", "hash"]
            );
        }
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_any_request() {
        let (scanner, executor, source) = scanner(&[A]);

        let err = scanner
            .start_scan(ScanOptions::new().with_count(0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = scanner
            .start_scan(ScanOptions::new().with_no_scores(true))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert_eq!(executor.call_count(), 0);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_default_count_applied() {
        let executor = Arc::new(MockExecutor::new());
        let source = Arc::new(MockTopologySource::new(even_shards(&[A])));
        let scanner = ClusterScanner::new(
            executor.clone(),
            source,
            ScanConfig::default().with_default_count(250),
        );
        executor.push_reply(A, "0", &[]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        session.next_page().await.unwrap();
        assert_eq!(executor.calls()[0].args_lossy(), vec!["0", "COUNT", "250"]);
    }

    #[tokio::test]
    async fn test_routing_stale_refreshes_once_and_retries() {
        let (scanner, executor, source) = scanner(&[A, B]);
        // Failover: shard 0 moves from A to C.
        source.push_topology(even_shards(&[C, B]));
        executor.push_moved(A);
        executor.push_reply(C, "0", &["x"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let page = session.next_page().await.unwrap();

        assert_eq!(keys(&page.entries), vec!["x"]);
        assert_eq!(
            ShardCursorCodec::decode(&page.cursor, 2).unwrap(),
            ShardCursorState::start_of(1)
        );
        assert_eq!(executor.calls_to(A), 1);
        assert_eq!(executor.calls_to(C), 1);
        // Initial fetch plus exactly one refresh.
        assert_eq!(source.fetch_count(), 2);

        let metrics = scanner.metrics().snapshot();
        assert_eq!(metrics.routing_retries, 1);
        assert_eq!(metrics.requests_total, 2);
    }

    #[tokio::test]
    async fn test_routing_stale_twice_is_surfaced() {
        let (scanner, executor, source) = scanner(&[A]);
        executor.push_moved(A);
        executor.push_moved(A);
        executor.push_reply(A, "0", &["late"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let err = session.next_page().await.unwrap_err();

        assert!(matches!(err, Error::RoutingStale { .. }));
        assert_eq!(executor.call_count(), 2);
        assert_eq!(source.fetch_count(), 2);
        assert_eq!(session.state(), SessionState::NotStarted);
        assert_eq!(scanner.metrics().errors.get(ErrorKind::RoutingStale), 1);

        // Failed call left the session untouched; retrying works.
        let page = session.next_page().await.unwrap();
        assert_eq!(keys(&page.entries), vec!["late"]);
    }

    #[tokio::test]
    async fn test_fatal_error_leaves_state_unchanged() {
        let (scanner, executor, source) = scanner(&[A, B]);
        executor.push_reply(A, "4", &["a"]);
        executor.push_error(A, Error::Remote("NOAUTH Authentication required".into()));
        executor.push_reply(A, "0", &["b"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let first = session.next_page().await.unwrap();

        let err = session.next_page().await.unwrap_err();
        assert_eq!(err, Error::Remote("NOAUTH Authentication required".into()));
        assert_eq!(session.cursor(), first.cursor);
        // Fatal errors never trigger a refresh.
        assert_eq!(source.fetch_count(), 1);

        let page = session.next_page().await.unwrap();
        assert_eq!(keys(&page.entries), vec!["b"]);
        assert_eq!(executor.calls()[2].args_lossy()[0], "4");
    }

    #[tokio::test]
    async fn test_topology_unavailable_on_refresh() {
        let (scanner, executor, source) = scanner(&[A]);
        executor.push_moved(A);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        // Initial fetch succeeds, refresh fails.
        scanner.topology().current().await.unwrap();
        source.fail_next(1);

        let err = session.next_page().await.unwrap_err();
        assert!(matches!(err, Error::TopologyUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(session.state(), SessionState::NotStarted);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_initial_topology_unavailable() {
        let (scanner, executor, source) = scanner(&[A]);
        source.fail_next(1);
        executor.push_reply(A, "0", &[]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let err = session.next_page().await.unwrap_err();
        assert!(matches!(err, Error::TopologyUnavailable(_)));
        assert_eq!(executor.call_count(), 0);

        assert!(session.next_page().await.unwrap().done);
    }

    #[tokio::test]
    async fn test_protocol_error_on_bad_cursor_reply() {
        let (scanner, executor, _) = scanner(&[A]);
        executor.push_reply(A, "not-a-number", &["k"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let err = session.next_page().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[tokio::test]
    async fn test_topology_shrinks_mid_scan() {
        let (scanner, executor, source) = scanner(&[A, B, C]);
        source.push_topology(even_shards(&[A]));
        executor.push_reply(A, "0", &["a"]);
        executor.push_moved(B);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let first = session.next_page().await.unwrap();
        assert!(!first.done);

        // Shard 1 no longer exists once the topology is refreshed.
        let err = session.next_page().await.unwrap_err();
        assert!(matches!(err, Error::RoutingStale { .. }));

        let last = session.next_page().await.unwrap();
        assert!(last.done);
        assert!(last.entries.is_empty());
    }

    #[tokio::test]
    async fn test_resume_from_persisted_cursor() {
        let (scanner, executor, _) = scanner(&[A, B]);
        executor.push_reply(A, "12", &["a"]);

        let mut session = scanner.start_scan(ScanOptions::new()).unwrap();
        let page = session.next_page().await.unwrap();
        let token = page.cursor.to_string();
        drop(session);

        executor.push_reply(A, "0", &["b"]);
        executor.push_reply(B, "0", &["c"]);

        let mut resumed = scanner
            .resume_scan(ScanOptions::new(), &ScanCursor::from(token))
            .await
            .unwrap();
        assert_eq!(resumed.state(), SessionState::InShard(ShardCursorState::new(0, 12)));

        let rest = resumed.collect_all().await.unwrap();
        assert_eq!(keys(&rest), vec!["b", "c"]);
        assert_eq!(executor.calls()[1].args_lossy()[0], "12");
    }

    #[tokio::test]
    async fn test_resume_terminal_and_initial_cursors() {
        let (scanner, executor, source) = scanner(&[A]);

        let mut done = scanner
            .resume_scan(ScanOptions::new(), &ScanCursor::finished())
            .await
            .unwrap();
        assert!(done.is_done());
        assert!(done.next_page().await.unwrap().done);

        let fresh = scanner
            .resume_scan(ScanOptions::new(), &ScanCursor::initial())
            .await
            .unwrap();
        assert_eq!(fresh.state(), SessionState::NotStarted);

        assert_eq!(executor.call_count(), 0);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_malformed_cursor() {
        let (scanner, _, _) = scanner(&[A]);
        let err = scanner
            .resume_scan(ScanOptions::new(), &ScanCursor::from("garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedCursor { .. }));
        assert_eq!(scanner.metrics().errors.get(ErrorKind::MalformedCursor), 1);
    }

    #[tokio::test]
    async fn test_resume_out_of_range_after_refresh() {
        let (scanner, _, source) = scanner(&[A, B]);
        let token = ShardCursorCodec::encode(&ShardCursorState::new(3, 5));

        let err = scanner
            .resume_scan(ScanOptions::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedCursor { .. }));
        // Initial fetch, then one refresh before giving up.
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_resume_stale_cursor_recovers_after_refresh() {
        let (scanner, _, source) = scanner(&[A]);
        // The cluster grew since the cursor was issued; the cached topology
        // is behind.
        source.push_topology(even_shards(&[A, B, C]));
        scanner.topology().current().await.unwrap();

        let token = ShardCursorCodec::encode(&ShardCursorState::new(2, 5));
        let session = scanner.resume_scan(ScanOptions::new(), &token).await.unwrap();
        assert_eq!(session.state(), SessionState::InShard(ShardCursorState::new(2, 5)));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_resume_without_stale_refresh() {
        let executor = Arc::new(MockExecutor::new());
        let source = Arc::new(MockTopologySource::new(even_shards(&[A])));
        let scanner = ClusterScanner::new(
            executor,
            source.clone(),
            ScanConfig::default().with_refresh_on_stale_cursor(false),
        );

        let token = ShardCursorCodec::encode(&ShardCursorState::new(1, 5));
        let err = scanner
            .resume_scan(ScanOptions::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedCursor { .. }));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_sessions_share_one_refresh() {
        let (scanner, executor, source) = scanner(&[A]);
        source.push_topology(even_shards(&[B]));

        let mut first = scanner.start_scan(ScanOptions::new()).unwrap();
        let mut second = scanner.start_scan(ScanOptions::new()).unwrap();

        executor.push_moved(A);
        executor.push_reply(B, "0", &["k"]);
        first.next_page().await.unwrap();

        // The second session still holds nothing and simply reads the
        // refreshed snapshot.
        executor.push_reply(B, "0", &["k"]);
        second.next_page().await.unwrap();

        assert_eq!(source.fetch_count(), 2);
        assert_eq!(executor.calls_to(A), 1);
        assert_eq!(executor.calls_to(B), 2);
        assert_eq!(Bytes::from_static(b"0"), executor.calls()[2].args[0]);
    }
}
