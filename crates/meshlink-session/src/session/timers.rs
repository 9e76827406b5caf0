//! Timer tasks driven by the session state machine.
//!
//! Each task holds a child token of its attempt and a weak reference to the
//! session; it exits as soon as either is gone. Results of engine queries are
//! handed back to the session, which re-checks the attempt before acting.
use std::sync::Weak;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::status::RunningInfo;

use super::Shared;

/// The last manager handle went away without `disconnect()`.
fn orphaned(attempt_id: u64) {
    tracing::warn!(
        attempt_id,
        "session manager dropped while a session is up; engine session left running"
    );
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// One-shot guard: force a disconnect if still connecting after `delay`.
pub(super) async fn connect_timeout(
    shared: Weak<Shared>,
    attempt_id: u64,
    token: CancellationToken,
    delay: Duration,
) {
    tokio::select! {
        biased;
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }
    match shared.upgrade() {
        Some(shared) => shared.on_connect_timeout(attempt_id, &token).await,
        None => orphaned(attempt_id),
    }
}

/// Poll running info until the engine confirms an address.
pub(super) async fn status_poll(
    shared: Weak<Shared>,
    attempt_id: u64,
    token: CancellationToken,
    period: Duration,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(shared) = shared.upgrade() else {
            orphaned(attempt_id);
            return;
        };

        let raw = match shared.engine.running_info().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(attempt_id, "running info unavailable: {e}");
                continue;
            }
        };
        if token.is_cancelled() {
            return;
        }

        let Some(info) = RunningInfo::parse(&raw) else {
            continue;
        };
        let Some(address) = info.confirmed_address() else {
            continue;
        };

        shared
            .on_address_confirmed(attempt_id, address, info.network_length(), &token)
            .await;
        return;
    }
}

/// Steady-state monitor: one tick per `period` while connected.
pub(super) async fn network_monitor(
    shared: Weak<Shared>,
    attempt_id: u64,
    token: CancellationToken,
    period: Duration,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let Some(shared) = shared.upgrade() else {
            orphaned(attempt_id);
            return;
        };
        shared.monitor_tick(attempt_id, &token).await;
    }
}
