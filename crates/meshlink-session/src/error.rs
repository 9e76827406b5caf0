use crate::types::SessionPhase;

/// Errors returned by [`SessionManager`](crate::SessionManager) operations.
///
/// Precondition failures leave the session untouched; engine failures
/// during session creation leave it `Idle`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already active ({phase})")]
    AlreadyActive { phase: SessionPhase },

    #[error("no room selected")]
    NoTarget,

    #[error("no usable server: enable a server or pick a room that bundles one")]
    NoUsableServer,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Failures reported by the overlay engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine rejected session: {0}")]
    Rejected(String),

    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("no session running")]
    NoSession,
}

/// Failures reported by the platform tunnel device.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("tunnel permission denied")]
    PermissionDenied,

    #[error("tunnel start failed: {0}")]
    Start(String),

    #[error("tunnel stop failed: {0}")]
    Stop(String),
}

/// Invalid network configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("mtu {0} below minimum 576")]
    MtuTooSmall(u16),

    #[error("parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_already_active() {
        let err = SessionError::AlreadyActive {
            phase: SessionPhase::Connecting,
        };
        assert_eq!(err.to_string(), "session already active (connecting)");
    }

    #[test]
    fn test_display_no_target() {
        assert_eq!(SessionError::NoTarget.to_string(), "no room selected");
    }

    #[test]
    fn test_display_engine_wraps_source() {
        let err = SessionError::from(EngineError::Rejected("bad secret".into()));
        assert_eq!(
            err.to_string(),
            "engine error: engine rejected session: bad secret"
        );
    }

    #[test]
    fn test_display_config_wraps_source() {
        let err = SessionError::from(ConfigError::InvalidCidr("10.0.0.1".into()));
        assert_eq!(
            err.to_string(),
            "invalid configuration: invalid CIDR: 10.0.0.1"
        );
    }

    #[test]
    fn test_display_no_session() {
        assert_eq!(EngineError::NoSession.to_string(), "no session running");
    }

    #[test]
    fn test_display_tunnel() {
        assert_eq!(
            TunnelError::Start("no device".into()).to_string(),
            "tunnel start failed: no device"
        );
        assert_eq!(
            TunnelError::PermissionDenied.to_string(),
            "tunnel permission denied"
        );
    }
}
