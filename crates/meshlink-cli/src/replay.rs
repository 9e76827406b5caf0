//! Scripted overlay engine for `meshlink simulate`.
//!
//! Reports "not connected" for the first `confirm_after` running-info
//! queries, then replays a recorded running-info document.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use meshlink_session::{EngineError, NetworkConfig, OverlayEngine, TunnelHandle};

#[derive(Clone)]
pub struct ReplayEngine {
    inner: Arc<Inner>,
}

struct Inner {
    document: String,
    confirm_after: usize,
    queries: AtomicUsize,
    active: AtomicBool,
}

impl ReplayEngine {
    pub fn new(document: String, confirm_after: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                document,
                confirm_after,
                queries: AtomicUsize::new(0),
                active: AtomicBool::new(false),
            }),
        }
    }

    pub fn queries(&self) -> usize {
        self.inner.queries.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl OverlayEngine for ReplayEngine {
    async fn create_session(&self, config: &NetworkConfig) -> Result<(), EngineError> {
        tracing::info!(
            network = %config.network_name,
            servers = config.servers.len(),
            "replay: session created"
        );
        self.inner.active.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn running_info(&self) -> Result<String, EngineError> {
        let seen = self.inner.queries.fetch_add(1, Ordering::Relaxed) + 1;
        if seen <= self.inner.confirm_after {
            return Ok(String::new());
        }
        Ok(self.inner.document.clone())
    }

    async fn network_status(&self) -> Result<serde_json::Value, EngineError> {
        Ok(serde_json::json!({ "replay": true, "queries": self.queries() }))
    }

    async fn destroy_session(&self) -> Result<(), EngineError> {
        self.inner.active.store(false, Ordering::Relaxed);
        tracing::debug!("replay: session destroyed");
        Ok(())
    }

    async fn bind_tunnel_handle(&self, handle: TunnelHandle) -> Result<(), EngineError> {
        if !self.inner.active.load(Ordering::Relaxed) {
            return Err(EngineError::NoSession);
        }
        tracing::info!(handle, "replay: tunnel handle bound");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn confirms_after_n_queries() {
        let engine = ReplayEngine::new("{}".into(), 2);
        assert_eq!(engine.running_info().await.unwrap(), "");
        assert_eq!(engine.running_info().await.unwrap(), "");
        assert_eq!(engine.running_info().await.unwrap(), "{}");
        assert_eq!(engine.queries(), 3);
    }

    #[tokio::test]
    async fn zero_confirms_immediately() {
        let engine = ReplayEngine::new("{}".into(), 0);
        assert_eq!(engine.running_info().await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn handle_needs_a_session() {
        let engine = ReplayEngine::new("{}".into(), 0);
        assert!(matches!(engine.bind_tunnel_handle(3).await, Err(EngineError::NoSession)));

        engine.create_session(&NetworkConfig::default()).await.unwrap();
        assert!(engine.bind_tunnel_handle(3).await.is_ok());

        engine.destroy_session().await.unwrap();
        assert!(engine.bind_tunnel_handle(3).await.is_err());
    }
}
