//! Integration test: monitor behaviour across many rounds.
//!
//! Exercises the round lifecycle through the public API only:
//! 1. Sustained manipulation raises one record per manipulated round
//! 2. A single-feed registry never raises anything
//! 3. Deviation exactly at the threshold is tolerated
//! 4. A zero consensus completes the round without scoring
//! 5. A failed feed read leaves no trace and the round is retried
//! 6. Registry order does not change which feeds are flagged
//! 7. Leave-one-out scoring flags only the spiked feed
//! 8. Records fan out to several sinks at once
//!
//! This test uses feedwatch-monitor only.

use std::sync::Arc;

use feedwatch_monitor::{
    AnomalyRecord, ConsensusPolicy, FnSink, MockPriceFeed, MonitorError, OracleMonitor,
    PriceFeed, RecordingSink, RoundStatus,
};

/// Default threshold: 5%.
const THRESHOLD_BPS: u32 = 500;

/// Helper: feeds named `feed-0`, `feed-1`, ... at the given prices.
fn make_feeds(prices: &[u64]) -> Vec<MockPriceFeed> {
    prices
        .iter()
        .enumerate()
        .map(|(i, p)| MockPriceFeed::new(format!("feed-{i}"), *p))
        .collect()
}

/// Helper: type-erased registry over the mock feeds.
fn registry(feeds: &[MockPriceFeed]) -> Vec<Arc<dyn PriceFeed>> {
    feeds
        .iter()
        .map(|f| Arc::new(f.clone()) as Arc<dyn PriceFeed>)
        .collect()
}

/// Helper: monitor with a recording sink.
fn recording_monitor(feeds: &[MockPriceFeed], threshold_bps: u32) -> OracleMonitor<RecordingSink> {
    OracleMonitor::new(registry(feeds), threshold_bps, RecordingSink::new())
        .expect("Monitor should build")
}

#[test]
fn test_sustained_manipulation_rearms_every_round() {
    let feeds = make_feeds(&[100, 100, 100]);
    let mut monitor = recording_monitor(&feeds, THRESHOLD_BPS);

    monitor.check().expect("Clean round");
    feeds[2].set_price(150);
    for _ in 0..5 {
        monitor.check().expect("Manipulated round");
    }
    feeds[2].set_price(100);
    monitor.check().expect("Recovered round");

    let sink = monitor.sink();
    assert_eq!(sink.len(), 5);
    assert_eq!(sink.rounds(), vec![1, 2, 3, 4, 5]);
    assert!(sink.records().iter().all(|r| r.feed_id.as_str() == "feed-2"));
    assert!(sink.records().iter().all(|r| r.deviation_bps == 5_000));
    assert_eq!(monitor.stats().anomalous_rounds, 5);
    assert_eq!(monitor.stats().last_anomaly_round, Some(5));
    assert_eq!(monitor.round(), 7);
}

#[test]
fn test_single_feed_never_emits() {
    let feeds = make_feeds(&[100]);
    let mut monitor = recording_monitor(&feeds, 1);

    for price in [100, 1, 1_000_000, 37, u64::MAX] {
        feeds[0].set_price(price);
        let report = monitor.check().expect("Round should complete");
        assert_eq!(report.consensus, price);
        assert_eq!(report.status, RoundStatus::Clean);
    }
    assert!(monitor.sink().is_empty());
}

#[test]
fn test_threshold_boundary() {
    let feeds = make_feeds(&[100, 100, 105]);
    let mut at_threshold = recording_monitor(&feeds, 500);
    let mut below_threshold = recording_monitor(&feeds, 499);

    let report = at_threshold.check().expect("Round should complete");
    assert!(!report.has_anomaly());

    let report = below_threshold.check().expect("Round should complete");
    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].feed_id.as_str(), "feed-2");
    assert_eq!(report.anomalies[0].deviation_bps, 500);
}

#[test]
fn test_zero_consensus_is_degenerate() {
    let feeds = make_feeds(&[0, 0, 100]);
    let mut monitor = recording_monitor(&feeds, THRESHOLD_BPS);

    let report = monitor.check().expect("Round should complete");
    assert_eq!(report.consensus, 0);
    assert!(report.is_degenerate());
    assert!(report.anomalies.is_empty());
    assert_eq!(monitor.round(), 1);
    assert_eq!(monitor.stats().degenerate_rounds, 1);

    // Scoring resumes once the consensus is positive again.
    feeds[0].set_price(100);
    feeds[1].set_price(100);
    feeds[2].set_price(300);
    let report = monitor.check().expect("Round should complete");
    assert_eq!(report.round, 1);
    assert_eq!(report.anomalies.len(), 1);
}

#[test]
fn test_failed_read_leaves_no_trace() {
    let feeds = make_feeds(&[100, 100, 300]);
    let mut monitor = recording_monitor(&feeds, THRESHOLD_BPS);

    monitor.check().expect("Round 0");
    feeds[1].set_available(false);

    let err = monitor.check().expect_err("Read should fail");
    match err {
        MonitorError::FeedRead { round, .. } => assert_eq!(round, 1),
        other => unreachable!("unexpected error: {other}"),
    }
    assert_eq!(monitor.round(), 1);
    assert_eq!(monitor.sink().len(), 1);
    assert_eq!(monitor.stats().failed_rounds, 1);

    feeds[1].set_available(true);
    let report = monitor.check().expect("Retry should complete");
    assert_eq!(report.round, 1);
    assert_eq!(monitor.sink().rounds(), vec![0, 1]);
}

#[test]
fn test_registry_order_does_not_change_flags() {
    let prices = [101, 99, 250, 100, 98];
    let mut flagged_sets = Vec::new();

    for rotation in 0..prices.len() {
        let mut rotated = prices.to_vec();
        rotated.rotate_left(rotation);
        let feeds: Vec<MockPriceFeed> = rotated
            .iter()
            .map(|p| MockPriceFeed::new(format!("p{p}"), *p))
            .collect();
        let mut monitor = recording_monitor(&feeds, THRESHOLD_BPS);

        let report = monitor.check().expect("Round should complete");
        assert_eq!(report.consensus, 100);
        let mut flagged: Vec<String> = report
            .anomalies
            .iter()
            .map(|a| a.feed_id.as_str().to_string())
            .collect();
        flagged.sort();
        flagged_sets.push(flagged);
    }

    assert!(flagged_sets.iter().all(|f| f == &vec!["p250".to_string()]));
}

#[test]
fn test_leave_one_out_flags_only_spiked_feed() {
    for prices in [[200, 100, 101], [100, 100, 400], [101, 100, 50]] {
        let feeds = make_feeds(&prices);
        let mut monitor =
            OracleMonitor::new(registry(&feeds), THRESHOLD_BPS, RecordingSink::new())
                .expect("Monitor should build")
                .with_policy(ConsensusPolicy::LeaveOneOut);

        let report = monitor.check().expect("Round should complete");
        let flagged: Vec<&str> = report.anomalies.iter().map(|a| a.feed_id.as_str()).collect();
        let spiked = if prices[0] == 200 { "feed-0" } else { "feed-2" };
        assert_eq!(flagged, vec![spiked], "prices {prices:?}");
    }
}

#[test]
fn test_leave_one_out_matches_inclusive_on_spike() {
    let feeds = make_feeds(&[200, 100, 101]);
    let mut inclusive = recording_monitor(&feeds, THRESHOLD_BPS);
    let mut leave_one_out =
        OracleMonitor::new(registry(&feeds), THRESHOLD_BPS, RecordingSink::new())
            .expect("Monitor should build")
            .with_policy(ConsensusPolicy::LeaveOneOut);

    let a = inclusive.check().expect("Round should complete");
    let b = leave_one_out.check().expect("Round should complete");
    assert_eq!(a.anomalies, b.anomalies);
    assert_eq!(b.anomalies[0].consensus_price, 101);
    assert_eq!(b.anomalies[0].deviation_bps, 9_801);
}

#[test]
fn test_records_fan_out_to_every_sink() {
    let feeds = make_feeds(&[100, 100, 200]);
    let mut seen: Vec<AnomalyRecord> = Vec::new();
    let sink = (
        RecordingSink::new(),
        FnSink(|r: &AnomalyRecord| seen.push(r.clone())),
    );
    let mut monitor =
        OracleMonitor::new(registry(&feeds), THRESHOLD_BPS, sink).expect("Monitor should build");

    monitor.check().expect("Round should complete");
    let (recording, _) = monitor.into_sink();

    assert_eq!(recording.len(), 1);
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], recording.records()[0]);
}
