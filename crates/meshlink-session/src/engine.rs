use crate::config::NetworkConfig;
use crate::error::EngineError;
use crate::types::TunnelHandle;

/// Overlay engine boundary.
///
/// The engine performs address assignment, NAT traversal and forwarding.
/// The session manager only creates and destroys sessions and reads back
/// what the engine reports.
#[async_trait::async_trait]
pub trait OverlayEngine: Send + Sync {
    /// Start a session with the resolved configuration.
    async fn create_session(&self, config: &NetworkConfig) -> Result<(), EngineError>;

    /// Raw running-info document (JSON). See [`RunningInfo`](crate::RunningInfo).
    async fn running_info(&self) -> Result<String, EngineError>;

    /// Aggregate network status, opaque to the session layer.
    async fn network_status(&self) -> Result<serde_json::Value, EngineError>;

    /// Tear the session down. Must succeed when no session exists.
    async fn destroy_session(&self) -> Result<(), EngineError>;

    /// Hand the platform tunnel device to the engine.
    async fn bind_tunnel_handle(&self, handle: TunnelHandle) -> Result<(), EngineError>;
}

// ── MockEngine (tests) ──────────────────────────────────────────────

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Inner {
        created: Vec<NetworkConfig>,
        destroyed: usize,
        running_info: String,
        fail_create: bool,
        fail_status: bool,
        running_info_queries: usize,
        bound_handles: Vec<TunnelHandle>,
        query_delay: Option<std::time::Duration>,
        /// A session exists between `create_session` and `destroy_session`.
        active: bool,
    }

    /// Scriptable engine that records every call.
    #[derive(Clone, Default)]
    pub struct MockEngine {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::default()
        }

        /// Document returned by the next running-info queries.
        pub fn set_running_info(&self, raw: &str) {
            self.inner.lock().unwrap().running_info = raw.to_string();
        }

        /// Make the engine report `addr` as the confirmed local address.
        pub fn confirm_address(&self, addr: u32) {
            self.set_running_info(&format!(
                r#"{{"my_node_info":{{"hostname":"me","virtual_ipv4":{{"address":{{"addr":{addr}}},"network_length":24}}}},"nodes":[]}}"#
            ));
        }

        pub fn set_fail_create(&self, fail: bool) {
            self.inner.lock().unwrap().fail_create = fail;
        }

        /// Delay every running-info query, simulating a slow engine.
        pub fn set_query_delay(&self, delay: std::time::Duration) {
            self.inner.lock().unwrap().query_delay = Some(delay);
        }

        pub fn set_fail_status(&self, fail: bool) {
            self.inner.lock().unwrap().fail_status = fail;
        }

        pub fn created(&self) -> Vec<NetworkConfig> {
            self.inner.lock().unwrap().created.clone()
        }

        pub fn destroyed(&self) -> usize {
            self.inner.lock().unwrap().destroyed
        }

        pub fn running_info_queries(&self) -> usize {
            self.inner.lock().unwrap().running_info_queries
        }

        pub fn bound_handles(&self) -> Vec<TunnelHandle> {
            self.inner.lock().unwrap().bound_handles.clone()
        }
    }

    #[async_trait::async_trait]
    impl OverlayEngine for MockEngine {
        async fn create_session(&self, config: &NetworkConfig) -> Result<(), EngineError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_create {
                return Err(EngineError::Rejected("mock: create failed".into()));
            }
            inner.created.push(config.clone());
            inner.active = true;
            Ok(())
        }

        async fn running_info(&self) -> Result<String, EngineError> {
            let delay = {
                let mut inner = self.inner.lock().unwrap();
                inner.running_info_queries += 1;
                inner.query_delay
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.inner.lock().unwrap().running_info.clone())
        }

        async fn network_status(&self) -> Result<serde_json::Value, EngineError> {
            if self.inner.lock().unwrap().fail_status {
                return Err(EngineError::Unavailable("mock: status failed".into()));
            }
            Ok(serde_json::json!({ "peers": 1 }))
        }

        async fn destroy_session(&self) -> Result<(), EngineError> {
            let mut inner = self.inner.lock().unwrap();
            inner.destroyed += 1;
            inner.active = false;
            Ok(())
        }

        async fn bind_tunnel_handle(&self, handle: TunnelHandle) -> Result<(), EngineError> {
            let mut inner = self.inner.lock().unwrap();
            if !inner.active {
                return Err(EngineError::NoSession);
            }
            inner.bound_handles.push(handle);
            Ok(())
        }
    }
}
