//! Session manager: owns the overlay session lifecycle.
//!
//! `Idle → Connecting → Connected → Idle`. The manager owns the single
//! connection attempt and its three timers (connect timeout, status poll,
//! network monitor). State changes run under a short-held async lock; engine
//! queries and tunnel calls run outside it, and their results are discarded
//! if the attempt changed meanwhile. Creating and destroying the engine
//! session is serialized by a second, lifecycle lock.
mod attempt;
mod timers;

pub use attempt::ArmedTimers;

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::config::{NetworkConfig, SessionConfig};
use crate::engine::OverlayEngine;
use crate::error::SessionError;
use crate::platform::{
    ConnectionNotice, NoopNotifier, NoopTunnel, Notifier, TunnelDevice, TunnelPermission,
    TunnelRequest,
};
use crate::status::RunningInfo;
use crate::topology::{TopologyCache, TopologyGraph};
use crate::types::{format_duration, Room, ServerEntry, SessionPhase, TunnelHandle};

use attempt::ConnectionAttempt;

// ── Events (manager → observers) ─────────────────────────────────────

/// Why a session returned to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    Requested,
    /// No address confirmed before the connect timeout.
    Timeout,
}

/// Session-level events observers may subscribe to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    /// The engine confirmed our virtual address.
    Connected { address: Ipv4Addr },
    /// The observed address changed while connected.
    AddressChanged { address: Ipv4Addr },
    /// The connect timeout fired while still connecting.
    TimedOut { attempt: u64 },
    Disconnected { reason: DisconnectReason },
    /// The engine refused to create the session.
    ConnectFailed { reason: String },
    /// The user declined the tunnel permission prompt; the attempt continues.
    TunnelPermissionDenied,
    TunnelFailed { reason: String },
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub attempt: Option<u64>,
    pub room: Option<String>,
    pub address: Option<Ipv4Addr>,
    pub elapsed_secs: u64,
    pub active_servers: Vec<String>,
    pub timers: ArmedTimers,
}

// ── Internal state ───────────────────────────────────────────────────

/// User-controlled inputs; `connect()` snapshots them.
struct Settings {
    base: NetworkConfig,
    room: Option<Room>,
}

struct SessionCore {
    phase: SessionPhase,
    attempt: Option<ConnectionAttempt>,
    next_attempt_id: u64,
    address: Option<Ipv4Addr>,
    active_servers: Vec<String>,
    tunnel_started: bool,
    topology: TopologyCache,
}

/// What a detached session still holds outside the core state.
struct Detached {
    tunnel_started: bool,
}

impl SessionCore {
    fn is_current(&self, attempt_id: u64, phase: SessionPhase) -> bool {
        self.phase == phase && self.attempt.as_ref().map(|a| a.id) == Some(attempt_id)
    }
}

struct Shared {
    engine: Arc<dyn OverlayEngine>,
    tunnel: Arc<dyn TunnelDevice>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
    settings: Mutex<Settings>,
    /// Held across engine create/destroy and tunnel stop. Never taken while
    /// `core` is held.
    lifecycle: tokio::sync::Mutex<()>,
    core: tokio::sync::Mutex<SessionCore>,
    /// Root token of the live attempt, reachable without the core lock so a
    /// disconnect can stop timers while a transition is still in flight.
    live_token: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<SessionEvent>,
    network_status: watch::Sender<Option<serde_json::Value>>,
    topology: watch::Sender<Arc<TopologyGraph>>,
}

// ── Builder ──────────────────────────────────────────────────────────

/// Builder for [`SessionManager`]. Tunnel and notifier default to no-ops.
pub struct SessionManagerBuilder {
    engine: Arc<dyn OverlayEngine>,
    tunnel: Arc<dyn TunnelDevice>,
    notifier: Arc<dyn Notifier>,
    config: SessionConfig,
    base: NetworkConfig,
}

impl SessionManagerBuilder {
    pub fn tunnel(mut self, tunnel: impl TunnelDevice + 'static) -> Self {
        self.tunnel = Arc::new(tunnel);
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_config(mut self, base: NetworkConfig) -> Self {
        self.base = base;
        self
    }

    pub fn build(self) -> SessionManager {
        let (events, _) = broadcast::channel(self.config.event_buffer);
        let (network_status, _) = watch::channel(None);
        let (topology, _) = watch::channel(Arc::new(TopologyGraph::default()));
        SessionManager {
            shared: Arc::new(Shared {
                engine: self.engine,
                tunnel: self.tunnel,
                notifier: self.notifier,
                config: self.config,
                settings: Mutex::new(Settings {
                    base: self.base,
                    room: None,
                }),
                lifecycle: tokio::sync::Mutex::new(()),
                core: tokio::sync::Mutex::new(SessionCore {
                    phase: SessionPhase::Idle,
                    attempt: None,
                    next_attempt_id: 0,
                    address: None,
                    active_servers: Vec::new(),
                    tunnel_started: false,
                    topology: TopologyCache::new(),
                }),
                live_token: Mutex::new(None),
                events,
                network_status,
                topology,
            }),
        }
    }
}

// ── SessionManager (app-facing API) ──────────────────────────────────

/// Handle to the session state machine. Cheap to clone.
///
/// Timer tasks hold only weak references; call [`disconnect`](Self::disconnect)
/// before dropping the last handle to tear the engine session down.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn builder(engine: impl OverlayEngine + 'static) -> SessionManagerBuilder {
        SessionManagerBuilder {
            engine: Arc::new(engine),
            tunnel: Arc::new(NoopTunnel),
            notifier: Arc::new(NoopNotifier),
            config: SessionConfig::default(),
            base: NetworkConfig::default(),
        }
    }

    /// Replace the base configuration used by the next `connect()`.
    pub fn set_base_config(&self, base: NetworkConfig) {
        self.shared.lock_settings().base = base;
    }

    /// Select (or clear) the room the next `connect()` joins.
    pub fn select_room(&self, room: Option<Room>) {
        self.shared.lock_settings().room = room;
    }

    /// Start a connection attempt. Returns the attempt id.
    ///
    /// Fails without side effects unless the session is idle, a room is
    /// selected, and at least one server is usable. If the engine refuses
    /// the session the manager stays idle.
    pub async fn connect(&self) -> Result<u64, SessionError> {
        self.shared.connect().await
    }

    /// Tear the session down from any phase. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.disconnect().await;
    }

    pub async fn phase(&self) -> SessionPhase {
        self.shared.core.lock().await.phase
    }

    pub async fn armed_timers(&self) -> ArmedTimers {
        let core = self.shared.core.lock().await;
        core.attempt.as_ref().map(|a| a.armed()).unwrap_or_default()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let core = self.shared.core.lock().await;
        let attempt = core.attempt.as_ref();
        SessionSnapshot {
            phase: core.phase,
            attempt: attempt.map(|a| a.id),
            room: attempt.map(|a| a.room.name.clone()),
            address: core.address,
            elapsed_secs: attempt.map(|a| a.elapsed_secs()).unwrap_or(0),
            active_servers: core.active_servers.clone(),
            timers: attempt.map(|a| a.armed()).unwrap_or_default(),
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Latest aggregate network status (`None` while not connected).
    pub fn network_status(&self) -> watch::Receiver<Option<serde_json::Value>> {
        self.shared.network_status.subscribe()
    }

    /// Latest topology graph (empty while not connected).
    pub fn topology(&self) -> watch::Receiver<Arc<TopologyGraph>> {
        self.shared.topology.subscribe()
    }

    /// Forward a tunnel device handle to the engine.
    ///
    /// Only accepted while connected with a started tunnel; returns whether
    /// the engine took it.
    pub async fn attach_tunnel_handle(&self, handle: TunnelHandle) -> bool {
        {
            let core = self.shared.core.lock().await;
            if core.phase != SessionPhase::Connected || !core.tunnel_started {
                tracing::warn!(handle, "tunnel handle arrived without a running tunnel, ignored");
                return false;
            }
        }
        match self.shared.engine.bind_tunnel_handle(handle).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(handle, "engine refused tunnel handle: {e}");
                false
            }
        }
    }
}

// ── Transitions ──────────────────────────────────────────────────────

impl Shared {
    fn lock_settings(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_live_token(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.live_token.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn set_phase(&self, core: &mut SessionCore, to: SessionPhase) {
        let from = core.phase;
        if from == to {
            return;
        }
        core.phase = to;
        tracing::info!(%from, %to, "session phase changed");
        self.emit(SessionEvent::PhaseChanged { from, to });
    }

    /// Servers the engine may use: enabled base servers, then the room's
    /// bundled servers not already listed.
    fn usable_servers(config: &NetworkConfig, room: &Room) -> Vec<ServerEntry> {
        let mut servers: Vec<ServerEntry> = config.enabled_servers().cloned().collect();
        for bundled in &room.servers {
            if !servers.iter().any(|s| s.url == bundled.url) {
                servers.push(bundled.clone());
            }
        }
        servers
    }

    async fn ensure_idle(&self) -> Result<(), SessionError> {
        let phase = self.core.lock().await.phase;
        if phase != SessionPhase::Idle {
            return Err(SessionError::AlreadyActive { phase });
        }
        Ok(())
    }

    /// Snapshot the selected room and resolve the configuration to submit.
    fn resolve_target(&self) -> Result<(Room, NetworkConfig), SessionError> {
        let (base, room) = {
            let settings = self.lock_settings();
            (settings.base.clone(), settings.room.clone())
        };
        let room = room.ok_or(SessionError::NoTarget)?;

        let mut resolved = match &room.overrides {
            Some(overrides) => base.layered(overrides),
            None => base,
        };
        let servers = Self::usable_servers(&resolved, &room);
        if servers.is_empty() {
            return Err(SessionError::NoUsableServer);
        }
        resolved.servers = servers;
        resolved.validate()?;
        Ok((room, resolved))
    }

    async fn connect(self: &Arc<Self>) -> Result<u64, SessionError> {
        self.ensure_idle().await?;
        let (room, resolved) = self.resolve_target()?;

        // May prompt the user; no lock is held meanwhile.
        if self.tunnel.prepare().await == TunnelPermission::Denied {
            tracing::warn!("tunnel permission denied, continuing without it");
            self.emit(SessionEvent::TunnelPermissionDenied);
        }

        let _lifecycle = self.lifecycle.lock().await;
        // Another connect may have won while the prompt was open.
        self.ensure_idle().await?;

        // Clear whatever a previous session may have left in the engine.
        self.shut_down(DisconnectReason::Requested).await;

        if let Err(e) = self.engine.create_session(&resolved).await {
            tracing::warn!(room = %room.name, "engine refused session: {e}");
            self.emit(SessionEvent::ConnectFailed {
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        let mut core = self.core.lock().await;
        core.next_attempt_id += 1;
        let attempt_id = core.next_attempt_id;
        tracing::info!(attempt_id, room = %room.name, "session created, waiting for address");

        let mut attempt = ConnectionAttempt::new(attempt_id, room, resolved);
        let timeout_token = attempt.arm_timeout();
        let poll_token = attempt.arm_poll();
        *self.lock_live_token() = Some(attempt.root_token());
        core.attempt = Some(attempt);
        self.set_phase(&mut core, SessionPhase::Connecting);

        tokio::spawn(timers::connect_timeout(
            Arc::downgrade(self),
            attempt_id,
            timeout_token,
            self.config.connect_timeout,
        ));
        tokio::spawn(timers::status_poll(
            Arc::downgrade(self),
            attempt_id,
            poll_token,
            self.config.poll_interval,
        ));

        Ok(attempt_id)
    }

    async fn disconnect(&self) {
        // Stop timers first; a connect may still hold the lifecycle lock.
        if let Some(token) = self.lock_live_token().take() {
            token.cancel();
        }
        let _lifecycle = self.lifecycle.lock().await;
        self.shut_down(DisconnectReason::Requested).await;
    }

    /// Return to idle, then release what the session held outside the core
    /// state. Callers hold the lifecycle lock.
    async fn shut_down(&self, reason: DisconnectReason) {
        let detached = {
            let mut core = self.core.lock().await;
            self.detach(&mut core, reason)
        };
        self.release(detached).await;
    }

    /// Clear session state and go idle. Does not wait on the engine or tunnel.
    fn detach(&self, core: &mut SessionCore, reason: DisconnectReason) -> Detached {
        if let Some(attempt) = core.attempt.take() {
            attempt.cancel_all();
        }
        if let Some(token) = self.lock_live_token().take() {
            token.cancel();
        }
        let tunnel_started = std::mem::take(&mut core.tunnel_started);
        self.notifier.cancel();

        core.active_servers.clear();
        core.address = None;
        core.topology.clear();
        self.network_status.send_replace(None);
        self.topology.send_replace(Arc::new(TopologyGraph::default()));

        if core.phase != SessionPhase::Idle {
            self.set_phase(core, SessionPhase::Idle);
            self.emit(SessionEvent::Disconnected { reason });
        }
        Detached { tunnel_started }
    }

    async fn release(&self, detached: Detached) {
        if detached.tunnel_started {
            if let Err(e) = self.tunnel.stop().await {
                tracing::warn!("tunnel stop failed: {e}");
            }
        }
        if let Err(e) = self.engine.destroy_session().await {
            tracing::warn!("engine teardown failed: {e}");
        }
    }

    async fn on_connect_timeout(&self, attempt_id: u64, token: &CancellationToken) {
        let _lifecycle = self.lifecycle.lock().await;
        let detached = {
            let mut core = self.core.lock().await;
            if token.is_cancelled() || !core.is_current(attempt_id, SessionPhase::Connecting) {
                return;
            }
            tracing::info!(
                attempt_id,
                timeout = ?self.config.connect_timeout,
                "no address confirmed in time, disconnecting"
            );
            self.emit(SessionEvent::TimedOut {
                attempt: attempt_id,
            });
            self.detach(&mut core, DisconnectReason::Timeout)
        };
        self.release(detached).await;
    }

    async fn on_address_confirmed(
        self: &Arc<Self>,
        attempt_id: u64,
        address: Ipv4Addr,
        prefix_len: u8,
        token: &CancellationToken,
    ) {
        let (request, monitor_token) = {
            let mut core = self.core.lock().await;
            if token.is_cancelled() || !core.is_current(attempt_id, SessionPhase::Connecting) {
                tracing::debug!(attempt_id, "stale poll result discarded");
                return;
            }

            let enabled: Vec<String> = self
                .lock_settings()
                .base
                .enabled_servers()
                .map(|s| s.name.clone())
                .collect();

            let Some(attempt) = core.attempt.as_mut() else {
                return;
            };
            attempt.disarm_timeout();
            attempt.disarm_poll();
            attempt.reset_elapsed();
            let monitor_token = attempt.arm_monitor();
            let active_servers = if enabled.is_empty() {
                attempt.room.servers.iter().map(|s| s.name.clone()).collect()
            } else {
                enabled
            };
            let request = TunnelRequest {
                address,
                prefix_len,
                mtu: attempt.config.mtu,
                excluded_apps: attempt.config.excluded_apps.clone(),
            };

            core.active_servers = active_servers;
            core.address = Some(address);
            self.set_phase(&mut core, SessionPhase::Connected);
            tracing::info!(attempt_id, %address, "session connected");
            self.emit(SessionEvent::Connected { address });

            self.notifier.show(&ConnectionNotice {
                status: SessionPhase::Connected,
                address: Some(address),
                duration: format_duration(0),
            });
            tokio::spawn(timers::network_monitor(
                Arc::downgrade(self),
                attempt_id,
                monitor_token.clone(),
                self.config.monitor_interval,
            ));
            (request, monitor_token)
        };

        let started = self.tunnel.start(&request).await;

        let mut core = self.core.lock().await;
        let current =
            !monitor_token.is_cancelled() && core.is_current(attempt_id, SessionPhase::Connected);
        match started {
            Ok(()) if current => core.tunnel_started = true,
            Ok(()) => {
                // A newer session may already own the device.
                let owned = core.tunnel_started;
                drop(core);
                if !owned {
                    tracing::debug!(attempt_id, "tunnel came up after the attempt ended, stopping");
                    if let Err(e) = self.tunnel.stop().await {
                        tracing::warn!("tunnel stop failed: {e}");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(cidr = %request.cidr(), "tunnel start failed: {e}");
                if current {
                    self.emit(SessionEvent::TunnelFailed {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    async fn monitor_tick(&self, attempt_id: u64, token: &CancellationToken) {
        // Query without holding the core lock; a disconnect must not wait on the engine.
        let info = match self.engine.running_info().await {
            Ok(raw) => RunningInfo::parse(&raw),
            Err(e) => {
                tracing::debug!(attempt_id, "running info unavailable: {e}");
                None
            }
        };
        let status = match self.engine.network_status().await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::debug!(attempt_id, "network status unavailable: {e}");
                None
            }
        };

        let mut core = self.core.lock().await;
        if token.is_cancelled() || !core.is_current(attempt_id, SessionPhase::Connected) {
            return;
        }
        let elapsed = match core.attempt.as_mut() {
            Some(attempt) => attempt.tick(),
            None => return,
        };

        if let Some(info) = &info {
            if let Some(address) = info.confirmed_address() {
                if core.address != Some(address) {
                    tracing::info!(%address, "virtual address changed");
                    core.address = Some(address);
                    self.emit(SessionEvent::AddressChanged { address });
                }
            }
            let local = core.address.map(|a| a.to_string()).unwrap_or_default();
            let (graph, rebuilt) = core.topology.update(&info.peer_records(), &local);
            if rebuilt {
                self.topology.send_replace(graph);
            }
        }
        if let Some(status) = status {
            self.network_status.send_replace(Some(status));
        }

        self.notifier.show(&ConnectionNotice {
            status: SessionPhase::Connected,
            address: core.address,
            duration: format_duration(elapsed),
        });
    }
}
