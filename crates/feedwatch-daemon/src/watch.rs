//! The watch loop.
//!
//! One task owns the monitor and drives it one round per tick, so rounds are
//! serialized by construction. Anomaly records reach subscribers through the
//! event bus as soon as `check` publishes them; round summaries follow once
//! the round has completed.

use std::time::Duration;

use feedwatch_monitor::{AlertSink, AnomalyRecord, MonitorError, RoundReport, TracingSink};
use feedwatch_sim::scenario::{FlashSpikeScenario, ScenarioReport};
use feedwatch_sim::SimError;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::WatchtowerConfig;
use crate::events::{EventBus, EventKind};

/// Publishes anomaly records onto the event bus.
#[derive(Clone)]
pub struct EventBusSink {
    bus: EventBus,
}

impl EventBusSink {
    /// Wrap an event bus.
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl AlertSink for EventBusSink {
    fn publish(&mut self, record: &AnomalyRecord) {
        self.bus.emit(EventKind::AnomalyDetected(record.clone()));
    }
}

/// Run the configured scenario until its last round or until `shutdown` fires.
///
/// A round that fails on a feed read is reported and retried on the next
/// tick; any other failure ends the loop.
pub async fn run(
    config: &WatchtowerConfig,
    bus: EventBus,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<ScenarioReport> {
    let sink = (TracingSink, EventBusSink::new(bus.clone()));
    let mut scenario = FlashSpikeScenario::new(config.scenario(), sink)?;
    let period = Duration::from_millis(config.simulation.tick_interval_ms.max(1));
    let mut ticker = tokio::time::interval(period);

    info!(
        rounds = config.simulation.rounds,
        interval_ms = period.as_millis() as u64,
        "watch loop started"
    );

    while !scenario.is_finished() {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!(round = scenario.monitor().round(), "watch loop interrupted");
                break;
            }
            _ = ticker.tick() => {}
        }

        match scenario.step() {
            Ok(report) => emit_round(&bus, &report),
            Err(SimError::Monitor(MonitorError::FeedRead { round, source })) => {
                warn!(round, error = %source, "feed read failed; retrying next tick");
                bus.emit(EventKind::FeedReadFailed {
                    round,
                    error: source.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(scenario.report())
}

/// Announce a completed round.
fn emit_round(bus: &EventBus, report: &RoundReport) {
    if report.is_degenerate() {
        bus.emit(EventKind::DegenerateRound {
            round: report.round,
            consensus: report.consensus,
        });
    }
    bus.emit(EventKind::round_completed(report));
}
