//! # sporehubd: sporehub daemon
//!
//! Composition root that wires the automation engine to its hardware and
//! runs until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (`sporehub.toml`, env vars)
//! - Initialize `tracing` from the configured filter
//! - Build the relay set and the starting profile
//! - Construct the hardware adapters (virtual board and enclosure)
//! - Spawn the engine runtime, the sensor feed and the climate simulation
//! - Handle graceful shutdown (SIGTERM/SIGINT), leaving every relay OFF
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer; no domain logic belongs here.

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

use sporehub_adapter_virtual::{Climate, EnclosureWiring, VirtualEnclosure, VirtualRelayBoard};
use sporehub_app::automation_engine::AutomationEngine;
use sporehub_app::clock::SystemClock;
use sporehub_app::event_bus::{InProcessEventBus, RelayChanges};
use sporehub_app::runtime::EngineRuntime;
use sporehub_app::sensor_feed::SensorFeed;
use sporehub_domain::event::{Event, EventKind};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading sporehub.toml")?;
    init_tracing(&config.logging.filter);

    let relays = Arc::new(config.relay_set()?);
    let profile = Arc::new(config.profile()?);
    tracing::info!(relays = relays.len(), preset = %config.profile.preset, "configuration loaded");

    // Hardware
    let board = Arc::new(VirtualRelayBoard::new());
    let enclosure = Arc::new(VirtualEnclosure::new(
        Arc::clone(&board),
        EnclosureWiring::from_relays(&relays),
        Climate::default(),
    ));

    // Engine
    let engine = AutomationEngine::new(
        relays,
        profile,
        Arc::clone(&board),
        SystemClock,
        config.engine_settings(),
    )?;
    let event_bus = Arc::new(InProcessEventBus::new(256));
    let events = event_bus.subscribe();
    let relay_changes = event_bus.subscribe_relay_changes(None);
    let (runtime, handle) =
        EngineRuntime::new(engine, Arc::clone(&event_bus), config.runtime_settings());
    let feed = SensorFeed::new(
        Arc::clone(&enclosure),
        SystemClock,
        handle,
        config.aggregator_settings(),
        config.poll_interval(),
    );

    // Tasks
    let (stop_tx, stop_rx) = watch::channel(false);
    let engine_task = tokio::spawn(runtime.run(stop_rx.clone()));
    let feed_task = tokio::spawn(feed.run(stop_rx.clone()));
    let simulation_task = {
        let enclosure = Arc::clone(&enclosure);
        let step_interval = config.step_interval();
        tokio::spawn(async move { enclosure.run(step_interval, stop_rx).await })
    };
    let log_task = tokio::spawn(log_events(events));
    let relay_log_task = tokio::spawn(log_relay_changes(relay_changes));

    shutdown_signal().await;
    tracing::info!("shutdown requested");
    // Fails only once every task has already exited.
    let _ = stop_tx.send(true);

    feed_task.await.context("sensor feed task")?;
    simulation_task.await.context("simulation task")?;
    let engine = engine_task.await.context("engine task")?;
    log_task.abort();
    relay_log_task.abort();

    let energized = board.energized();
    if !energized.is_empty() {
        tracing::warn!(?energized, "outputs still energized after shutdown");
    }
    tracing::info!(
        sensor_status = ?engine.sensor_status(),
        "sporehubd stopped"
    );
    Ok(())
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter `{filter}` ({err}), falling back to `info`");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Log the engine's event stream. Relay changes are already logged by the
/// engine itself.
async fn log_events(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(event) => match &event.kind {
                EventKind::RelayChanged(_) => {}
                kind => tracing::debug!(id = %event.id, at = %event.timestamp, ?kind, "engine event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event log lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn log_relay_changes(mut changes: RelayChanges) {
    while let Some((at, change)) = changes.next().await {
        tracing::debug!(
            relay = %change.relay_id,
            on = change.new_state,
            cause = %change.cause,
            %at,
            "relay changed"
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
