//! Session timing and overlay network configuration.
//!
//! [`SessionConfig`] holds the state machine's timing knobs. [`NetworkConfig`]
//! is the configuration submitted to the overlay engine; a room may carry a
//! [`NetworkOverrides`] bundle that is layered over it field by field.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::address;
use crate::error::ConfigError;
use crate::types::ServerEntry;

/// Time allowed for the engine to confirm an address.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default tunnel MTU.
pub const DEFAULT_MTU: u16 = 1380;

/// Timing configuration for a [`SessionManager`](crate::SessionManager).
///
/// ```rust
/// use std::time::Duration;
/// use meshlink_session::SessionConfig;
///
/// let config = SessionConfig::new()
///     .connect_timeout(Duration::from_secs(30))
///     .poll_interval(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) connect_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) monitor_interval: Duration,
    pub(crate) event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    /// Create a config with defaults.
    ///
    /// If `MESHLINK_CONNECT_TIMEOUT_SECS` is set to a positive integer it
    /// replaces the 15 second connect timeout. This can be overridden with
    /// [`.connect_timeout()`](Self::connect_timeout).
    pub fn new() -> Self {
        let connect_timeout = std::env::var("MESHLINK_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        Self {
            connect_timeout,
            poll_interval: Duration::from_secs(1),
            monitor_interval: Duration::from_secs(1),
            event_buffer: 64,
        }
    }

    /// Time allowed in `Connecting` before a forced disconnect (default: 15 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Status poll period while connecting (default: 1 s).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Network monitor period while connected (default: 1 s).
    pub fn monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Capacity of the session event broadcast channel (default: 64).
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}

/// Base overlay configuration submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub hostname: String,
    pub network_name: String,
    pub network_secret: String,
    /// Static virtual address in CIDR form. Ignored when `dhcp` is set.
    pub virtual_ipv4: Option<String>,
    pub dhcp: bool,
    pub servers: Vec<ServerEntry>,
    pub mtu: u16,
    pub listeners: Vec<String>,
    pub latency_first: bool,
    pub enable_encryption: bool,
    /// Applications routed around the tunnel.
    pub excluded_apps: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            network_name: String::new(),
            network_secret: String::new(),
            virtual_ipv4: None,
            dhcp: true,
            servers: Vec::new(),
            mtu: DEFAULT_MTU,
            listeners: Vec::new(),
            latency_first: false,
            enable_encryption: true,
            excluded_apps: Vec::new(),
        }
    }
}

impl NetworkConfig {
    /// Servers currently enabled in this configuration.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers.iter().filter(|s| s.enabled)
    }

    /// Apply `overrides` on top of `self`. Only fields present in the bundle
    /// replace the base value.
    pub fn layered(&self, overrides: &NetworkOverrides) -> NetworkConfig {
        let mut merged = self.clone();
        if let Some(v) = &overrides.hostname {
            merged.hostname = v.clone();
        }
        if let Some(v) = &overrides.network_name {
            merged.network_name = v.clone();
        }
        if let Some(v) = &overrides.network_secret {
            merged.network_secret = v.clone();
        }
        if let Some(v) = &overrides.virtual_ipv4 {
            merged.virtual_ipv4 = Some(v.clone());
        }
        if let Some(v) = overrides.dhcp {
            merged.dhcp = v;
        }
        if let Some(v) = &overrides.servers {
            merged.servers = v.clone();
        }
        if let Some(v) = overrides.mtu {
            merged.mtu = v;
        }
        if let Some(v) = &overrides.listeners {
            merged.listeners = v.clone();
        }
        if let Some(v) = overrides.latency_first {
            merged.latency_first = v;
        }
        if let Some(v) = overrides.enable_encryption {
            merged.enable_encryption = v;
        }
        if let Some(v) = &overrides.excluded_apps {
            merged.excluded_apps = v.clone();
        }
        merged
    }

    /// Check fields the engine would otherwise reject late.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network_name.trim().is_empty() {
            return Err(ConfigError::MissingField("network_name"));
        }
        if !self.dhcp {
            match &self.virtual_ipv4 {
                Some(cidr) if address::is_valid_cidr(cidr) => {}
                Some(cidr) => return Err(ConfigError::InvalidCidr(cidr.clone())),
                None => return Err(ConfigError::MissingField("virtual_ipv4")),
            }
        }
        if self.mtu < 576 {
            return Err(ConfigError::MtuTooSmall(self.mtu));
        }
        Ok(())
    }

    /// Load from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Per-room configuration bundle; absent fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkOverrides {
    pub hostname: Option<String>,
    pub network_name: Option<String>,
    pub network_secret: Option<String>,
    pub virtual_ipv4: Option<String>,
    pub dhcp: Option<bool>,
    pub servers: Option<Vec<ServerEntry>>,
    pub mtu: Option<u16>,
    pub listeners: Option<Vec<String>>,
    pub latency_first: Option<bool>,
    pub enable_encryption: Option<bool>,
    pub excluded_apps: Option<Vec<String>>,
}
