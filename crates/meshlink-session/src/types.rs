use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::NetworkOverrides;

/// Lifecycle phase of the overlay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No attempt in progress.
    Idle,
    /// Session created, waiting for the engine to confirm an address.
    Connecting,
    /// Address confirmed, monitoring.
    Connected,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// A rendezvous / relay server the engine may use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    /// Listener URL, e.g. `tcp://relay.example.net:11010`.
    pub url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ServerEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }
}

/// The room (target network) a connection attempt joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Servers shipped with the room, usable even when none are enabled locally.
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
    /// Per-room configuration bundle layered over the base configuration.
    #[serde(default)]
    pub overrides: Option<NetworkOverrides>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            servers: Vec::new(),
            overrides: None,
        }
    }
}

/// Platform tunnel device handle (a file descriptor on unix platforms).
pub type TunnelHandle = i32;

/// Render elapsed seconds as `MM:SS`, or `HH:MM:SS` from one hour on.
pub fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_under_an_hour() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(65), "01:05");
        assert_eq!(format_duration(3599), "59:59");
    }

    #[test]
    fn duration_from_an_hour() {
        assert_eq!(format_duration(3600), "01:00:00");
        assert_eq!(format_duration(3725), "01:02:05");
        assert_eq!(format_duration(100 * 3600), "100:00:00");
    }

    #[test]
    fn server_entry_enabled_defaults_true() {
        let entry: ServerEntry =
            serde_json::from_str(r#"{"name":"a","url":"tcp://a:11010"}"#).unwrap();
        assert!(entry.enabled);
    }

    #[test]
    fn phase_display() {
        assert_eq!(SessionPhase::Connecting.to_string(), "connecting");
    }
}
