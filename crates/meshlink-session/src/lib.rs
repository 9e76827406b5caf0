//! meshlink session layer.
//!
//! Drives one overlay network session at a time on top of an external
//! engine: `Idle → Connecting → Connected`, with a connect timeout, a status
//! poll while connecting and a monitor while connected.
//!
//! Engine: [`OverlayEngine`] (async-trait seam, supplied by the host).
//! Platform: [`TunnelDevice`] + [`Notifier`], no-op by default.

pub mod address;
pub mod config;
pub mod engine;
pub mod error;
pub mod platform;
pub mod session;
pub mod status;
pub mod topology;
pub mod types;

pub use address::{
    address_to_text, is_valid_address, is_valid_cidr, parse_address, parse_cidr, UNASSIGNED,
};
pub use config::{NetworkConfig, NetworkOverrides, SessionConfig, DEFAULT_CONNECT_TIMEOUT};
pub use engine::OverlayEngine;
pub use error::{ConfigError, EngineError, SessionError, TunnelError};
pub use platform::{
    ConnectionNotice, NoopNotifier, NoopTunnel, Notifier, TunnelDevice, TunnelPermission,
    TunnelRequest,
};
pub use session::{
    ArmedTimers, DisconnectReason, SessionEvent, SessionManager, SessionManagerBuilder,
    SessionSnapshot,
};
pub use status::RunningInfo;
pub use topology::{
    build as build_topology, GraphEdge, GraphNode, HopRecord, NodeRole, PeerRecord,
    TopologyCache, TopologyGraph,
};
pub use types::{format_duration, Room, ServerEntry, SessionPhase, TunnelHandle};
