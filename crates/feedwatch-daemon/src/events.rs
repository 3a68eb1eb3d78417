//! Event emission system.
//!
//! Round outcomes and anomaly records are pushed to subscribers over a
//! broadcast channel. Each subscriber has an independent buffer; a subscriber
//! that falls behind loses the oldest events and is told how many it missed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use feedwatch_monitor::{AnomalyRecord, RoundReport, RoundStatus};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::warn;

/// What happened.
///
/// Serialized adjacently tagged, so a log line reads
/// `{"event_type": "AnomalyDetected", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload")]
pub enum EventKind {
    /// The watchtower came up.
    WatchtowerStarted {
        version: String,
        feeds: Vec<String>,
        threshold_bps: u32,
    },
    /// A single anomalous feed in one round.
    AnomalyDetected(AnomalyRecord),
    /// A round's consensus was zero and scoring was skipped.
    DegenerateRound { round: u64, consensus: u64 },
    /// A round ran to completion.
    RoundCompleted {
        round: u64,
        consensus: u64,
        status: RoundStatus,
        anomalies: usize,
    },
    /// A round was abandoned because a feed could not be read.
    FeedReadFailed { round: u64, error: String },
    /// The watchtower is shutting down.
    WatchtowerStopped { events: u64 },
}

impl EventKind {
    /// Summary of a completed round.
    pub fn round_completed(report: &RoundReport) -> Self {
        Self::RoundCompleted {
            round: report.round,
            consensus: report.consensus,
            status: report.status,
            anomalies: report.anomalies.len(),
        }
    }

    /// Event type name (e.g. "AnomalyDetected", "RoundCompleted").
    pub fn name(&self) -> &'static str {
        match self {
            Self::WatchtowerStarted { .. } => "WatchtowerStarted",
            Self::AnomalyDetected(_) => "AnomalyDetected",
            Self::DegenerateRound { .. } => "DegenerateRound",
            Self::RoundCompleted { .. } => "RoundCompleted",
            Self::FeedReadFailed { .. } => "FeedReadFailed",
            Self::WatchtowerStopped { .. } => "WatchtowerStopped",
        }
    }

    /// Category: "anomaly", "round" or "system".
    pub fn category(&self) -> &'static str {
        match self {
            Self::AnomalyDetected(_) | Self::DegenerateRound { .. } | Self::FeedReadFailed { .. } => {
                "anomaly"
            }
            Self::RoundCompleted { .. } => "round",
            Self::WatchtowerStarted { .. } | Self::WatchtowerStopped { .. } => "system",
        }
    }

    /// Feed the event is about, if any.
    pub fn feed_id(&self) -> Option<&str> {
        match self {
            Self::AnomalyDetected(record) => Some(record.feed_id.as_str()),
            _ => None,
        }
    }
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the bus's emission order, starting at 1.
    pub sequence: u64,
    /// Unix timestamp.
    pub timestamp: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Category filter: "anomaly", "round", "system".
    pub categories: Option<Vec<String>>,
    /// Filter to specific feeds.
    pub feed_ids: Option<Vec<String>>,
}

impl EventFilter {
    /// Filter on categories only. An empty list matches everything.
    pub fn for_categories(categories: &[String]) -> Self {
        Self {
            categories: (!categories.is_empty()).then(|| categories.to_vec()),
            feed_ids: None,
        }
    }

    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref categories) = self.categories {
            let category = event.kind.category();
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }

        // Events without a feed pass the feed filter
        match (&self.feed_ids, event.kind.feed_id()) {
            (Some(feed_ids), Some(feed)) => feed_ids.iter().any(|id| id == feed),
            _ => true,
        }
    }
}

/// Stamps events and fans them out to every subscriber.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus; each subscriber buffers up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Stamp `kind` with the next sequence number and the current time, then
    /// broadcast it. Returns the event as sent.
    ///
    /// Events emitted while nobody is subscribed are still numbered.
    pub fn emit(&self, kind: EventKind) -> Event {
        let event = Event {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: unix_now(),
            kind,
        };
        if self.sender.send(event.clone()).is_err() {
            tracing::trace!(event = event.kind.name(), "no subscribers");
        }
        event
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Append every matching event to `path` as one JSON object per line.
///
/// Runs until every sender of the bus is dropped. Returns the number of lines
/// written.
pub async fn write_event_log(
    mut rx: broadcast::Receiver<Event>,
    filter: EventFilter,
    path: PathBuf,
) -> anyhow::Result<u64> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let mut written = 0u64;

    loop {
        match rx.recv().await {
            Ok(event) => {
                if !filter.matches(&event) {
                    continue;
                }
                let mut line = serde_json::to_vec(&event)?;
                line.push(b'\n');
                file.write_all(&line).await?;
                written += 1;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, path = %path.display(), "event log lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    file.flush().await?;
    Ok(written)
}
