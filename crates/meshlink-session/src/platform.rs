//! Platform capabilities: tunnel device and connection notification.
//!
//! Platforms without a feature use the no-op implementations, chosen when the
//! [`SessionManager`](crate::SessionManager) is built.
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::error::TunnelError;
use crate::types::SessionPhase;

/// Outcome of asking the platform for tunnel permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelPermission {
    Granted,
    Denied,
}

/// Parameters for bringing the tunnel device up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub mtu: u16,
    pub excluded_apps: Vec<String>,
}

impl TunnelRequest {
    /// `address/prefix` as handed to the platform.
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_len)
    }
}

/// System-level tunnel device.
#[async_trait::async_trait]
pub trait TunnelDevice: Send + Sync {
    /// Ask for permission to create the device. May prompt the user.
    async fn prepare(&self) -> TunnelPermission;

    /// Bring the device up. The device handle arrives later through
    /// [`SessionManager::attach_tunnel_handle`](crate::SessionManager::attach_tunnel_handle).
    async fn start(&self, request: &TunnelRequest) -> Result<(), TunnelError>;

    async fn stop(&self) -> Result<(), TunnelError>;
}

/// Tunnel for platforms where the engine owns the device itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTunnel;

#[async_trait::async_trait]
impl TunnelDevice for NoopTunnel {
    async fn prepare(&self) -> TunnelPermission {
        TunnelPermission::Granted
    }

    async fn start(&self, _request: &TunnelRequest) -> Result<(), TunnelError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), TunnelError> {
        Ok(())
    }
}

/// Content of the ongoing connection notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionNotice {
    pub status: SessionPhase,
    pub address: Option<Ipv4Addr>,
    /// Elapsed time, see [`format_duration`](crate::format_duration).
    pub duration: String,
}

/// User-facing connection notification. Calls must not block.
pub trait Notifier: Send + Sync {
    fn show(&self, notice: &ConnectionNotice);
    fn cancel(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn show(&self, _notice: &ConnectionNotice) {}
    fn cancel(&self) {}
}

// ── Mocks (tests) ───────────────────────────────────────────────────

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct TunnelLog {
        permission_denied: bool,
        fail_start: bool,
        start_delay: Option<Duration>,
        stop_delay: Option<Duration>,
        prepared: usize,
        started: Vec<TunnelRequest>,
        stopped: usize,
    }

    /// Tunnel that records calls.
    #[derive(Clone, Default)]
    pub struct MockTunnel {
        log: Arc<Mutex<TunnelLog>>,
    }

    impl MockTunnel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn deny_permission(&self) {
            self.log.lock().unwrap().permission_denied = true;
        }

        pub fn set_fail_start(&self, fail: bool) {
            self.log.lock().unwrap().fail_start = fail;
        }

        /// Make `start()` take `delay` before completing.
        pub fn set_start_delay(&self, delay: Duration) {
            self.log.lock().unwrap().start_delay = Some(delay);
        }

        /// Make `stop()` take `delay` before completing.
        pub fn set_stop_delay(&self, delay: Duration) {
            self.log.lock().unwrap().stop_delay = Some(delay);
        }

        pub fn prepared(&self) -> usize {
            self.log.lock().unwrap().prepared
        }

        pub fn started(&self) -> Vec<TunnelRequest> {
            self.log.lock().unwrap().started.clone()
        }

        pub fn stopped(&self) -> usize {
            self.log.lock().unwrap().stopped
        }
    }

    #[async_trait::async_trait]
    impl TunnelDevice for MockTunnel {
        async fn prepare(&self) -> TunnelPermission {
            let mut log = self.log.lock().unwrap();
            log.prepared += 1;
            if log.permission_denied {
                TunnelPermission::Denied
            } else {
                TunnelPermission::Granted
            }
        }

        async fn start(&self, request: &TunnelRequest) -> Result<(), TunnelError> {
            let delay = self.log.lock().unwrap().start_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut log = self.log.lock().unwrap();
            if log.permission_denied {
                return Err(TunnelError::PermissionDenied);
            }
            if log.fail_start {
                return Err(TunnelError::Start("mock: no device".into()));
            }
            log.started.push(request.clone());
            Ok(())
        }

        async fn stop(&self) -> Result<(), TunnelError> {
            let delay = self.log.lock().unwrap().stop_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.log.lock().unwrap().stopped += 1;
            Ok(())
        }
    }

    /// Notifier that records every notice and cancellation.
    #[derive(Clone, Default)]
    pub struct MockNotifier {
        shown: Arc<Mutex<Vec<ConnectionNotice>>>,
        cancelled: Arc<Mutex<usize>>,
    }

    impl MockNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn shown(&self) -> Vec<ConnectionNotice> {
            self.shown.lock().unwrap().clone()
        }

        pub fn cancelled(&self) -> usize {
            *self.cancelled.lock().unwrap()
        }
    }

    impl Notifier for MockNotifier {
        fn show(&self, notice: &ConnectionNotice) {
            self.shown.lock().unwrap().push(notice.clone());
        }

        fn cancel(&self) {
            *self.cancelled.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tunnel_request_cidr() {
        let request = TunnelRequest {
            address: Ipv4Addr::new(10, 126, 126, 3),
            prefix_len: 24,
            mtu: 1380,
            excluded_apps: Vec::new(),
        };
        assert_eq!(request.cidr(), "10.126.126.3/24");
    }

    #[tokio::test]
    async fn noop_tunnel_always_grants() {
        assert_eq!(NoopTunnel.prepare().await, TunnelPermission::Granted);
        assert!(NoopTunnel.stop().await.is_ok());
    }
}
