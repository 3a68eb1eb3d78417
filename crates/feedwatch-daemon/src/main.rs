//! feedwatch-daemon: the oracle watchtower process.
//!
//! Single OS process running a Tokio async runtime. It drives the simulated
//! price feeds, runs the monitor once per tick, fans anomaly records out over
//! the event bus, and optionally appends them to a JSON-lines log.

mod config;
mod events;
mod watch;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::WatchtowerConfig;
use crate::events::{EventBus, EventFilter, EventKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config (the log level lives there)
    let config = WatchtowerConfig::load()?;

    // 2. Initialize tracing
    let level = config.advanced.log_level.as_str();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("feedwatch_daemon={level}").parse()?)
                .add_directive(format!("feedwatch_monitor={level}").parse()?)
                .add_directive(format!("feedwatch_sim={level}").parse()?),
        )
        .init();

    info!("Feedwatch watchtower starting");
    config.validate()?;

    // 3. Create event bus
    let event_bus = EventBus::new(config.alerts.event_buffer);

    // 4. Start the alert log, if configured
    let log_task = config.alert_log_path().map(|path| {
        info!("Writing alerts to {:?}", path);
        let filter = EventFilter::for_categories(&config.alerts.categories);
        tokio::spawn(events::write_event_log(event_bus.subscribe(), filter, path))
    });

    // 5. Create shutdown channel, wired to Ctrl-C
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            let _ = ctrl_c_tx.send(());
        }
    });

    event_bus.emit(EventKind::WatchtowerStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        feeds: config.feeds.ids.clone(),
        threshold_bps: config.monitor.threshold_bps,
    });

    // 6. Run rounds until done or interrupted
    let result = watch::run(&config, event_bus.clone(), shutdown_rx).await;

    let stopped = event_bus.emit(EventKind::WatchtowerStopped {
        events: event_bus.sequence(),
    });

    // Graceful shutdown
    let emitted = stopped.sequence;
    drop(event_bus);
    drop(shutdown_tx);
    if let Some(task) = log_task {
        match task.await {
            Ok(Ok(written)) => info!(written, "alert log closed"),
            Ok(Err(e)) => error!("alert log error: {}", e),
            Err(e) => error!("alert log task failed: {}", e),
        }
    }

    let report = result?;
    match (report.first_detection, report.detection_latency) {
        (Some(round), Some(latency)) => {
            info!(round, latency, "flash spike detected");
        }
        _ if report.attack_round.is_some() => {
            warn!("flash spike was not detected");
        }
        _ => {}
    }
    if !report.pre_attack_anomalies.is_empty() {
        warn!(
            rounds = ?report.pre_attack_anomalies,
            "anomalies raised before the attack"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(events = emitted, "Watchtower stopped");
    Ok(())
}
