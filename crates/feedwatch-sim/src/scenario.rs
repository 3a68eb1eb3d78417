//! Flash-spike scenario.
//!
//! Every round the harness moves the true price, has each feed report a noisy
//! reading of it, and then asks the monitor to check. On the attack round the
//! target feed is overwritten with `spike_multiplier * true_price` and the
//! attacker borrows from the single-feed lending protocol at that price before
//! the monitor runs.
//!
//! Detection is the first round at or after the attack in which the monitor
//! publishes a record naming the target feed. Detection latency is the
//! distance from the attack round to that round.

use std::sync::Arc;

use feedwatch_monitor::{
    AlertSink, ConsensusPolicy, FeedId, MockPriceFeed, MonitorStats, OracleMonitor, PriceFeed,
    RoundReport,
};
use serde::{Deserialize, Serialize};

use crate::lending::SimpleLendingProtocol;
use crate::random_walk::{RandomWalk, WalkParams, DEFAULT_DRIFT, DEFAULT_NOISE};
use crate::{Result, SimError};

/// Parameters of a flash-spike run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Feed identifiers, in registry order.
    pub feed_ids: Vec<String>,
    /// Starting true price.
    pub initial_price: u64,
    /// Monitor threshold in basis points.
    pub threshold_bps: u32,
    /// Monitor consensus policy.
    pub policy: ConsensusPolicy,
    /// Number of rounds to run.
    pub rounds: u64,
    /// Round at which the target feed is spiked. `None` runs without an attack.
    pub attack_round: Option<u64>,
    /// Index into `feed_ids` of the feed to spike. The lending protocol reads it.
    pub target_feed: usize,
    /// Spiked price as a multiple of the true price.
    pub spike_multiplier: u64,
    /// Random walk drift.
    pub drift: f64,
    /// Per-feed reading noise.
    pub noise: f64,
    /// RNG seed. `None` draws from entropy.
    pub seed: Option<u64>,
    /// Collateral the attacker deposits before the run.
    pub collateral: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            feed_ids: vec![
                "feed-a".to_string(),
                "feed-b".to_string(),
                "feed-c".to_string(),
            ],
            initial_price: 100,
            threshold_bps: 500,
            policy: ConsensusPolicy::Inclusive,
            rounds: 200,
            attack_round: Some(100),
            target_feed: 0,
            spike_multiplier: 2,
            drift: DEFAULT_DRIFT,
            noise: DEFAULT_NOISE,
            seed: None,
            collateral: 1,
        }
    }
}

impl ScenarioConfig {
    /// Check the harness-side parameters.
    ///
    /// Feed set and threshold are validated by the monitor itself.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidScenario`] describing the first inconsistency found
    pub fn validate(&self) -> Result<()> {
        if self.target_feed >= self.feed_ids.len() {
            return Err(SimError::InvalidScenario(format!(
                "target feed index {} out of range for {} feeds",
                self.target_feed,
                self.feed_ids.len()
            )));
        }
        if let Some(attack) = self.attack_round {
            if attack >= self.rounds {
                return Err(SimError::InvalidScenario(format!(
                    "attack round {attack} not before round limit {}",
                    self.rounds
                )));
            }
        }
        if self.initial_price == 0 {
            return Err(SimError::InvalidScenario(
                "initial price must be non-zero".to_string(),
            ));
        }
        if self.spike_multiplier == 0 {
            return Err(SimError::InvalidScenario(
                "spike multiplier must be at least 1".to_string(),
            ));
        }
        if !(self.drift.is_finite() && self.drift >= 0.0) {
            return Err(SimError::InvalidScenario(format!("bad drift {}", self.drift)));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(SimError::InvalidScenario(format!("bad noise {}", self.noise)));
        }
        Ok(())
    }
}

/// What the harness did to the feeds for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Round the prices were set for.
    pub round: u64,
    /// Rounded true price after this tick's step.
    pub true_price: u64,
    /// Whether the target feed was spiked.
    pub spiked: bool,
}

/// Owns the mock feeds and moves their prices.
pub struct PriceHarness {
    feeds: Vec<MockPriceFeed>,
    walk: RandomWalk,
    attack_round: Option<u64>,
    target: usize,
    spike_multiplier: u64,
}

impl PriceHarness {
    /// Create feeds at the initial price.
    pub fn new(config: &ScenarioConfig) -> Result<Self> {
        config.validate()?;
        let feeds = config
            .feed_ids
            .iter()
            .map(|id| MockPriceFeed::new(id.as_str(), config.initial_price))
            .collect();
        let params = WalkParams {
            drift: config.drift,
            noise: config.noise,
        };
        Ok(Self {
            feeds,
            walk: RandomWalk::new(config.initial_price, params, config.seed),
            attack_round: config.attack_round,
            target: config.target_feed,
            spike_multiplier: config.spike_multiplier,
        })
    }

    /// Handles to every feed, in registry order.
    pub fn feeds(&self) -> &[MockPriceFeed] {
        &self.feeds
    }

    /// The feeds as a monitor registry.
    pub fn registry(&self) -> Vec<Arc<dyn PriceFeed>> {
        self.feeds
            .iter()
            .map(|f| Arc::new(f.clone()) as Arc<dyn PriceFeed>)
            .collect()
    }

    /// The feed that gets spiked.
    pub fn target(&self) -> &MockPriceFeed {
        &self.feeds[self.target]
    }

    /// Move prices for `round`.
    pub fn tick(&mut self, round: u64) -> Tick {
        self.walk.step();
        for feed in &self.feeds {
            feed.set_price(self.walk.reading());
        }

        let spiked = self.attack_round == Some(round);
        if spiked {
            let spike = self.walk.scaled(self.spike_multiplier);
            tracing::warn!(
                round,
                feed = %self.target().id(),
                price = spike,
                "injecting flash spike"
            );
            self.target().set_price(spike);
        }

        Tick {
            round,
            true_price: self.walk.scaled(1),
            spiked,
        }
    }
}

/// Summary of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Rounds completed.
    pub rounds_run: u64,
    /// Configured attack round.
    pub attack_round: Option<u64>,
    /// The spiked feed.
    pub target_feed: FeedId,
    /// Every round with at least one anomaly.
    pub anomalous_rounds: Vec<u64>,
    /// Anomalous rounds before the attack.
    pub pre_attack_anomalies: Vec<u64>,
    /// First round at or after the attack naming the target feed.
    pub first_detection: Option<u64>,
    /// `first_detection - attack_round`.
    pub detection_latency: Option<u64>,
    /// Target feed's deviation in the detecting round.
    pub spike_deviation_bps: Option<u64>,
    /// What the attacker borrowed at the spiked price.
    pub attacker_borrowed: u64,
    /// What the same collateral could borrow at the true price.
    pub honest_borrow_limit: u64,
    /// Monitor diagnostics at the end of the run.
    pub stats: MonitorStats,
}

impl ScenarioReport {
    /// Value extracted beyond the honest limit.
    pub fn excess_borrowed(&self) -> u64 {
        self.attacker_borrowed.saturating_sub(self.honest_borrow_limit)
    }
}

/// Harness, monitor and victim protocol wired together.
pub struct FlashSpikeScenario<S> {
    config: ScenarioConfig,
    harness: PriceHarness,
    monitor: OracleMonitor<S>,
    protocol: SimpleLendingProtocol,
    ticked: Option<u64>,
    anomalous_rounds: Vec<u64>,
    first_detection: Option<(u64, u64)>,
    attacker_borrowed: u64,
    honest_borrow_limit: u64,
}

impl<S: AlertSink> FlashSpikeScenario<S> {
    /// Build feeds, monitor and protocol, and deposit the attacker's collateral.
    ///
    /// # Errors
    ///
    /// - [`SimError::InvalidScenario`] for inconsistent harness parameters
    /// - [`SimError::Monitor`] if the monitor rejects the feed set or threshold
    pub fn new(config: ScenarioConfig, sink: S) -> Result<Self> {
        let harness = PriceHarness::new(&config)?;
        let monitor = OracleMonitor::new(harness.registry(), config.threshold_bps, sink)?
            .with_policy(config.policy);
        let mut protocol = SimpleLendingProtocol::new(Arc::new(harness.target().clone()));
        protocol.deposit_collateral(config.collateral)?;

        tracing::info!(
            feeds = config.feed_ids.len(),
            rounds = config.rounds,
            attack_round = ?config.attack_round,
            target = %harness.target().id(),
            "flash-spike scenario ready"
        );

        Ok(Self {
            config,
            harness,
            monitor,
            protocol,
            ticked: None,
            anomalous_rounds: Vec::new(),
            first_detection: None,
            attacker_borrowed: 0,
            honest_borrow_limit: 0,
        })
    }

    /// Whether every configured round has run.
    pub fn is_finished(&self) -> bool {
        self.monitor.round() >= self.config.rounds
    }

    /// Tick prices, let the attacker act, and run one monitor round.
    ///
    /// Prices move once per round index. A round retried after a failed feed
    /// read is checked against the prices already set for it, and the
    /// attacker does not act twice.
    pub fn step(&mut self) -> Result<RoundReport> {
        let round = self.monitor.round();
        if self.ticked != Some(round) {
            let tick = self.harness.tick(round);
            self.ticked = Some(round);
            if tick.spiked {
                self.honest_borrow_limit = self.protocol.borrow_limit_at(tick.true_price)?;
                self.attacker_borrowed += self.protocol.borrow()?;
            }
        }

        let report = self.monitor.check()?;
        self.observe(&report);
        Ok(report)
    }

    /// Run every remaining round and summarise.
    pub fn run(mut self) -> Result<ScenarioReport> {
        while !self.is_finished() {
            self.step()?;
        }
        let report = self.report();
        if let Some(latency) = report.detection_latency {
            tracing::info!(latency, "detection latency");
        }
        Ok(report)
    }

    /// Summary of the rounds run so far.
    pub fn report(&self) -> ScenarioReport {
        let pre_attack_anomalies = match self.config.attack_round {
            Some(attack) => self
                .anomalous_rounds
                .iter()
                .copied()
                .filter(|r| *r < attack)
                .collect(),
            None => self.anomalous_rounds.clone(),
        };
        let first_detection = self.first_detection.map(|(round, _)| round);
        ScenarioReport {
            rounds_run: self.monitor.round(),
            attack_round: self.config.attack_round,
            target_feed: self.harness.target().id().clone(),
            anomalous_rounds: self.anomalous_rounds.clone(),
            pre_attack_anomalies,
            first_detection,
            detection_latency: first_detection
                .zip(self.config.attack_round)
                .map(|(detected, attack)| detected - attack),
            spike_deviation_bps: self.first_detection.map(|(_, bps)| bps),
            attacker_borrowed: self.attacker_borrowed,
            honest_borrow_limit: self.honest_borrow_limit,
            stats: self.monitor.stats().clone(),
        }
    }

    /// The monitor under test.
    pub fn monitor(&self) -> &OracleMonitor<S> {
        &self.monitor
    }

    /// The price harness.
    pub fn harness(&self) -> &PriceHarness {
        &self.harness
    }

    fn observe(&mut self, report: &RoundReport) {
        if report.has_anomaly() {
            self.anomalous_rounds.push(report.round);
        }
        if self.first_detection.is_some() {
            return;
        }
        let Some(attack) = self.config.attack_round else {
            return;
        };
        if report.round < attack {
            return;
        }
        let target = self.harness.target().id();
        if let Some(record) = report.anomalies.iter().find(|a| &a.feed_id == target) {
            self.first_detection = Some((report.round, record.deviation_bps));
        }
    }
}
