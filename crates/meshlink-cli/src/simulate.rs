use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use meshlink_session::{
    ConnectionNotice, NetworkConfig, Notifier, Room, SessionConfig, SessionManager,
};
use tokio::sync::broadcast::error::RecvError;

use crate::events::{emit, EventSummary};
use crate::replay::ReplayEngine;

pub struct SimulateConfig {
    pub config: PathBuf,
    pub running_info: PathBuf,
    pub room: String,
    pub confirm_after: usize,
    pub run_for: Duration,
    pub connect_timeout: Option<Duration>,
}

/// Notifier that writes the connection notice to the log.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn show(&self, notice: &ConnectionNotice) {
        tracing::info!(
            status = %notice.status,
            address = ?notice.address,
            duration = %notice.duration,
            "notice"
        );
    }

    fn cancel(&self) {
        tracing::info!("notice cancelled");
    }
}

pub async fn run(sim: SimulateConfig) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&sim.config)
        .with_context(|| format!("reading {}", sim.config.display()))?;
    let base = NetworkConfig::from_json(&raw)
        .with_context(|| format!("parsing {}", sim.config.display()))?;
    let document = std::fs::read_to_string(&sim.running_info)
        .with_context(|| format!("reading {}", sim.running_info.display()))?;

    let engine = ReplayEngine::new(document, sim.confirm_after);
    let mut session_config = SessionConfig::new();
    if let Some(timeout) = sim.connect_timeout {
        session_config = session_config.connect_timeout(timeout);
    }

    let manager = SessionManager::builder(engine.clone())
        .notifier(LogNotifier)
        .config(session_config)
        .base_config(base)
        .build();
    manager.select_room(Some(Room::new(sim.room.clone(), sim.room)));

    let mut events = manager.subscribe();
    let attempt = manager.connect().await.context("connect failed")?;
    tracing::info!(attempt, "simulation started");

    let deadline = tokio::time::sleep(sim.run_for);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(event) => emit(&event),
                Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let topology = manager.topology().borrow().clone();
    if !topology.is_empty() {
        emit(&serde_json::json!({ "event": "topology", "graph": &*topology }));
    }

    manager.disconnect().await;
    while let Ok(event) = events.try_recv() {
        emit(&event);
    }

    let snapshot = manager.snapshot().await;
    emit(&EventSummary::new(engine.queries(), &snapshot));
    Ok(())
}
