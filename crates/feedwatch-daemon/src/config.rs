//! Configuration file management.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use feedwatch_monitor::{ConfigError, ConsensusPolicy, FeedId, Threshold};
use feedwatch_sim::scenario::ScenarioConfig;
use serde::{Deserialize, Serialize};

/// Complete watchtower configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchtowerConfig {
    /// Detection settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// Feed registry.
    #[serde(default)]
    pub feeds: FeedsConfig,
    /// Simulated price ticks and attack.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Alert output.
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Relative deviation bound in basis points, 1..=10000.
    #[serde(default = "default_threshold_bps")]
    pub threshold_bps: u32,
    /// "inclusive" | "leave_one_out".
    #[serde(default)]
    pub policy: ConsensusPolicy,
}

/// Feed registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Feed identifiers in registry order.
    #[serde(default = "default_feed_ids")]
    pub ids: Vec<String>,
    /// Starting price for every feed.
    #[serde(default = "default_initial_price")]
    pub initial_price: u64,
    /// Index of the feed the lending protocol reads (and the attacker spikes).
    #[serde(default)]
    pub target: usize,
}

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Rounds to run before exiting.
    #[serde(default = "default_rounds")]
    pub rounds: u64,
    /// Inject a flash spike.
    #[serde(default = "default_true")]
    pub attack_enabled: bool,
    /// Round of the flash spike.
    #[serde(default = "default_attack_round")]
    pub attack_round: u64,
    /// Spiked price as a multiple of the true price.
    #[serde(default = "default_spike_multiplier")]
    pub spike_multiplier: u64,
    /// Delay between rounds in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// RNG seed. Absent = random.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Random walk drift.
    #[serde(default = "default_drift")]
    pub drift: f64,
    /// Per-feed reading noise.
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Attacker collateral.
    #[serde(default = "default_collateral")]
    pub collateral: u64,
}

/// Alert output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// JSON-lines event log. Empty = disabled.
    #[serde(default)]
    pub log_file: String,
    /// Event categories written to the log: "anomaly" | "round" | "system".
    /// Empty = all.
    #[serde(default = "default_alert_categories")]
    pub categories: Vec<String>,
    /// Event bus buffer per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_threshold_bps() -> u32 {
    500
}

fn default_feed_ids() -> Vec<String> {
    vec![
        "feed-a".to_string(),
        "feed-b".to_string(),
        "feed-c".to_string(),
    ]
}

fn default_initial_price() -> u64 {
    100
}

fn default_rounds() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_attack_round() -> u64 {
    100
}

fn default_spike_multiplier() -> u64 {
    2
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_drift() -> f64 {
    feedwatch_sim::random_walk::DEFAULT_DRIFT
}

fn default_noise() -> f64 {
    feedwatch_sim::random_walk::DEFAULT_NOISE
}

fn default_collateral() -> u64 {
    1
}

fn default_alert_categories() -> Vec<String> {
    vec!["anomaly".to_string()]
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold_bps: default_threshold_bps(),
            policy: ConsensusPolicy::default(),
        }
    }
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            ids: default_feed_ids(),
            initial_price: default_initial_price(),
            target: 0,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            attack_enabled: true,
            attack_round: default_attack_round(),
            spike_multiplier: default_spike_multiplier(),
            tick_interval_ms: default_tick_interval_ms(),
            seed: None,
            drift: default_drift(),
            noise: default_noise(),
            collateral: default_collateral(),
        }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            log_file: String::new(),
            categories: default_alert_categories(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl WatchtowerConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: WatchtowerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the monitor or harness would refuse.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feeds.ids.is_empty() {
            return Err(ConfigError::EmptyFeedSet.into());
        }
        let mut seen = HashSet::new();
        for id in &self.feeds.ids {
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::DuplicateFeed(FeedId::new(id.as_str())).into());
            }
        }
        Threshold::new(self.monitor.threshold_bps)?;
        self.scenario().validate()?;
        Ok(())
    }

    /// The harness parameters these settings describe.
    pub fn scenario(&self) -> ScenarioConfig {
        ScenarioConfig {
            feed_ids: self.feeds.ids.clone(),
            initial_price: self.feeds.initial_price,
            threshold_bps: self.monitor.threshold_bps,
            policy: self.monitor.policy,
            rounds: self.simulation.rounds,
            attack_round: self
                .simulation
                .attack_enabled
                .then_some(self.simulation.attack_round),
            target_feed: self.feeds.target,
            spike_multiplier: self.simulation.spike_multiplier,
            drift: self.simulation.drift,
            noise: self.simulation.noise,
            seed: self.simulation.seed,
            collateral: self.simulation.collateral,
        }
    }

    /// Path of the JSON-lines event log, if enabled.
    pub fn alert_log_path(&self) -> Option<PathBuf> {
        if self.alerts.log_file.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.alerts.log_file))
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        // Explicit file wins over the data directory
        if let Ok(path) = std::env::var("FEEDWATCH_CONFIG") {
            return PathBuf::from(path);
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("FEEDWATCH_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Feedwatch")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".feedwatch")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/feedwatch"))
}
