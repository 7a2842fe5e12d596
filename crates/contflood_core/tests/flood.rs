mod helpers;

use contflood_core::driver::{AttackDriver, FloodError, LoopOutcome, FILLER_LEN};
use contflood_core::fleet::Fleet;
use contflood_core::stats::{FloodStats, StreamIdAllocator};
use contflood_net::{FrameType, HandshakeError};
use helpers::{stream_frames, test_config, FlakyDialer, MockDialer, PeerBehavior, RefusingDialer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn budget_expiry_closes_the_header_block() {
    let dialer = Arc::new(MockDialer::new(PeerBehavior::Tolerant));
    let fleet = Fleet::new(test_config(1, Duration::from_millis(300)), dialer.clone());

    let summary = fleet.run().await.unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.stats.sent_headers, 1);
    assert_eq!(summary.reports[0].outcome, LoopOutcome::BudgetElapsed);

    let received = dialer.received().await;
    let frames = stream_frames(&received[0]);

    let headers = frames[0];
    assert_eq!(headers.kind, FrameType::Headers);
    assert!(!headers.end_headers());
    assert!(!headers.end_stream());

    let continuations = &frames[1..];
    assert!(continuations.iter().all(|f| f.kind == FrameType::Continuation));
    assert!(continuations.iter().all(|f| f.stream_id == headers.stream_id));

    let (last, open) = continuations.split_last().unwrap();
    assert!(last.end_headers());
    assert!(!open.is_empty());
    assert!(open.iter().all(|f| !f.end_headers()));
    assert!(continuations.iter().all(|f| f.len > FILLER_LEN));

    // everything the driver counted as sent reached the peer
    assert_eq!(summary.stats.sent_continuation, continuations.len() as u64);
    assert_eq!(summary.reports[0].continuations, continuations.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sustained_throughput_over_the_budget() {
    let dialer = Arc::new(MockDialer::new(PeerBehavior::Tolerant));
    let fleet = Fleet::new(test_config(1, Duration::from_millis(500)), dialer.clone());

    let summary = fleet.run().await.unwrap();
    dialer.received().await;

    // a 1 KiB in-memory write costs far less than 5ms
    assert!(
        summary.stats.sent_continuation >= 100,
        "only {} CONTINUATION frames in 500ms",
        summary.stats.sent_continuation
    );
    assert!(summary.stats.latency.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn patched_server_hang_up_stops_the_flood() {
    let dialer = Arc::new(MockDialer::new(PeerBehavior::CloseAfter(3)));
    let fleet = Fleet::new(test_config(1, Duration::from_secs(30)), dialer.clone());

    let summary = timeout(Duration::from_secs(10), fleet.run())
        .await
        .expect("flood kept going after the server hung up")
        .unwrap();

    let report = &summary.reports[0];
    assert_eq!(report.outcome, LoopOutcome::PeerClosed);
    assert!(report.continuations >= 3);
    assert_eq!(summary.closed_by_peer(), 1);

    let received = dialer.received().await;
    let frames = stream_frames(&received[0]);
    assert_eq!(frames[0].kind, FrameType::Headers);
    assert_eq!(
        frames.iter().filter(|f| f.kind == FrameType::Continuation).count(),
        3
    );
    assert!(frames.iter().all(|f| !f.end_headers()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn staggered_connections_get_distinct_odd_stream_ids() {
    let dialer = Arc::new(MockDialer::new(PeerBehavior::Tolerant));
    let mut config = test_config(3, Duration::from_millis(50));
    config.launch_delay = Duration::from_millis(100);
    let fleet = Fleet::new(config, dialer.clone());

    let started = Instant::now();
    let summary = fleet.run().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));

    assert_eq!(summary.completed, 3);
    assert_eq!(summary.stream_ids(), vec![1, 3, 5]);
    assert_eq!(summary.stats.sent_headers, 3);

    let received = dialer.received().await;
    for (frames, expected_id) in received.iter().zip([1u32, 3, 5]) {
        let frames = stream_frames(frames);
        assert!(frames.iter().all(|f| f.stream_id == expected_id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_connection_reports_completion() {
    let dialer = Arc::new(MockDialer::new(PeerBehavior::Tolerant));
    let fleet = Fleet::new(test_config(6, Duration::from_millis(50)), dialer.clone());

    let summary = fleet.run().await.unwrap();
    assert_eq!(summary.completed, 6);
    assert_eq!(summary.reports.len(), 6);

    let ids: HashSet<u32> = summary.stream_ids().into_iter().collect();
    assert_eq!(ids.len(), 6);
    assert!(ids.iter().all(|id| id % 2 == 1));
    assert_eq!(ids, (0..6).map(|i| 1 + 2 * i).collect::<HashSet<u32>>());

    assert_eq!(summary.stats.sent_headers, 6);
    assert!(summary.to_string().contains("--- Summary ---"));
    dialer.received().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_first_frame_is_fatal() {
    let dialer = Arc::new(MockDialer::new(PeerBehavior::WrongFirstFrame));
    let fleet = Fleet::new(test_config(2, Duration::from_secs(30)), dialer);

    let err = timeout(Duration::from_secs(10), fleet.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        FloodError::Handshake {
            source: HandshakeError::Unexpected(FrameType::Ping),
            ..
        }
    ));
}

#[tokio::test]
async fn unreachable_target_is_fatal() {
    let fleet = Fleet::new(test_config(1, Duration::from_secs(1)), Arc::new(RefusingDialer));

    let err = fleet.run().await.unwrap_err();
    assert!(matches!(err, FloodError::Dial { driver: 0, .. }));
    assert!(err.to_string().contains("connection refused"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn zero_budget_sends_only_the_closing_frame() {
    let dialer = MockDialer::new(PeerBehavior::Tolerant);
    let config = Arc::new(test_config(1, Duration::ZERO));
    let stats = Arc::new(FloodStats::new());
    let driver = AttackDriver::new(0, config, stats.clone(), Arc::new(StreamIdAllocator::new()));

    let report = driver.run(&dialer).await.unwrap();
    assert_eq!(report.continuations, 1);
    assert_eq!(report.outcome, LoopOutcome::BudgetElapsed);

    let received = dialer.received().await;
    let frames = stream_frames(&received[0]);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].kind, FrameType::Headers);
    assert_eq!(frames[1].kind, FrameType::Continuation);
    assert!(frames[1].end_headers());

    let snap = stats.snapshot();
    assert_eq!((snap.sent_headers, snap.sent_continuation), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_server_cannot_outlast_the_budget() {
    let dialer = Arc::new(MockDialer::with_buffer(PeerBehavior::StopReading, 8 * 1024));
    let fleet = Fleet::new(test_config(1, Duration::from_millis(200)), dialer.clone());

    let started = Instant::now();
    let summary = timeout(Duration::from_secs(5), fleet.run())
        .await
        .expect("flood outlived its time limit while the server stopped reading")
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));

    assert_eq!(summary.completed, 1);
    let report = &summary.reports[0];
    assert_eq!(report.outcome, LoopOutcome::BudgetElapsed);
    // only what fit in the pipe before it filled up
    assert!(report.continuations <= 8, "{} frames sent", report.continuations);

    dialer.received().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_write_errors_do_not_end_the_flood() {
    // preface, SETTINGS, SETTINGS-ACK, HEADERS, then two CONTINUATIONs
    let dialer = FlakyDialer {
        inner: MockDialer::new(PeerBehavior::Tolerant),
        healthy_writes: 6,
        failures: 3,
    };
    let config = Arc::new(test_config(1, Duration::from_millis(200)));
    let driver = AttackDriver::new(
        0,
        config,
        Arc::new(FloodStats::new()),
        Arc::new(StreamIdAllocator::new()),
    );

    let report = timeout(Duration::from_secs(5), driver.run(&dialer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, LoopOutcome::BudgetElapsed);

    let received = dialer.inner.received().await;
    let frames = stream_frames(&received[0]);
    let continuations = frames
        .iter()
        .filter(|f| f.kind == FrameType::Continuation)
        .count() as u64;

    // failed frames stay buffered and reach the peer with the next write
    assert_eq!(continuations, report.continuations + 3);
    assert!(frames.last().unwrap().end_headers());
    assert_eq!(frames.iter().filter(|f| f.end_headers()).count(), 1);
}
