//! Anomaly records and the sinks that receive them.
//!
//! Every record carries enough to reconstruct why the alarm fired: the round,
//! the feed, what it reported, what it was compared against, and the
//! resulting deviation. Sinks receive records synchronously from
//! [`OracleMonitor::check`](crate::OracleMonitor::check), in increasing round
//! order, and a round's records are all delivered before `check` returns.

use serde::{Deserialize, Serialize};

use crate::feed::FeedId;

/// A feed flagged in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    /// Round in which the anomaly was observed.
    pub round: u64,
    /// The offending feed.
    pub feed_id: FeedId,
    /// Price the feed reported.
    pub observed_price: u64,
    /// Reference price the feed was scored against.
    pub consensus_price: u64,
    /// Relative deviation in basis points.
    pub deviation_bps: u64,
}

/// Destination for anomaly records.
pub trait AlertSink {
    /// Publish one record. Called once per anomalous feed per round.
    fn publish(&mut self, record: &AnomalyRecord);
}

impl<S: AlertSink + ?Sized> AlertSink for &mut S {
    fn publish(&mut self, record: &AnomalyRecord) {
        (**self).publish(record);
    }
}

impl<S: AlertSink + ?Sized> AlertSink for Box<S> {
    fn publish(&mut self, record: &AnomalyRecord) {
        (**self).publish(record);
    }
}

impl<A: AlertSink, B: AlertSink> AlertSink for (A, B) {
    fn publish(&mut self, record: &AnomalyRecord) {
        self.0.publish(record);
        self.1.publish(record);
    }
}

/// Keeps every published record in memory for polling.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    records: Vec<AnomalyRecord>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records published so far, oldest first.
    pub fn records(&self) -> &[AnomalyRecord] {
        &self.records
    }

    /// Records published for `round`.
    pub fn for_round(&self, round: u64) -> impl Iterator<Item = &AnomalyRecord> {
        self.records.iter().filter(move |r| r.round == round)
    }

    /// Distinct rounds that produced at least one record, ascending.
    pub fn rounds(&self) -> Vec<u64> {
        let mut rounds: Vec<u64> = self.records.iter().map(|r| r.round).collect();
        rounds.dedup();
        rounds
    }

    /// First round at or after `from` with a record.
    pub fn first_round_from(&self, from: u64) -> Option<u64> {
        self.records.iter().map(|r| r.round).find(|r| *r >= from)
    }

    /// Take every record, leaving the sink empty.
    pub fn drain(&mut self) -> Vec<AnomalyRecord> {
        std::mem::take(&mut self.records)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record is held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AlertSink for RecordingSink {
    fn publish(&mut self, record: &AnomalyRecord) {
        self.records.push(record.clone());
    }
}

/// Logs each record as a structured `warn` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn publish(&mut self, record: &AnomalyRecord) {
        tracing::warn!(
            round = record.round,
            feed = %record.feed_id,
            observed = record.observed_price,
            consensus = record.consensus_price,
            deviation_bps = record.deviation_bps,
            "price feed anomaly detected"
        );
    }
}

/// Forwards each record to a closure.
pub struct FnSink<F>(pub F);

impl<F: FnMut(&AnomalyRecord)> AlertSink for FnSink<F> {
    fn publish(&mut self, record: &AnomalyRecord) {
        (self.0)(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(round: u64, feed: &str) -> AnomalyRecord {
        AnomalyRecord {
            round,
            feed_id: FeedId::new(feed),
            observed_price: 200,
            consensus_price: 100,
            deviation_bps: 10_000,
        }
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        sink.publish(&record(3, "a"));
        sink.publish(&record(3, "b"));
        sink.publish(&record(5, "a"));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.rounds(), vec![3, 5]);
        assert_eq!(sink.for_round(3).count(), 2);
        assert_eq!(sink.first_round_from(4), Some(5));
        assert_eq!(sink.first_round_from(6), None);
    }

    #[test]
    fn test_drain_empties_sink() {
        let mut sink = RecordingSink::new();
        sink.publish(&record(1, "a"));
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_tuple_sink_fans_out() {
        let mut pair = (RecordingSink::new(), RecordingSink::new());
        pair.publish(&record(0, "a"));
        assert_eq!(pair.0.len(), 1);
        assert_eq!(pair.1.len(), 1);
    }

    fn publish_to(mut sink: impl AlertSink, record: &AnomalyRecord) {
        sink.publish(record);
    }

    #[test]
    fn test_fn_sink_and_borrowed_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = FnSink(|r: &AnomalyRecord| seen.push(r.round));
            publish_to(&mut sink, &record(7, "a"));
            publish_to(&mut sink, &record(8, "a"));
        }
        assert_eq!(seen, vec![7, 8]);
    }

    #[test]
    fn test_record_json_shape() {
        let json = serde_json::to_value(record(9, "feed-a")).expect("serialize");
        assert_eq!(json["round"], 9);
        assert_eq!(json["feed_id"], "feed-a");
        assert_eq!(json["observed_price"], 200);
        assert_eq!(json["consensus_price"], 100);
        assert_eq!(json["deviation_bps"], 10_000);
    }
}
