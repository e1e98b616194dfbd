//! Gateway shared state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use parlance_core::config::Config;
use parlance_pipeline::{PipelineOrchestrator, SessionBufferRegistry};

/// Shared gateway state accessible from all connections and handlers.
///
/// The session buffer registry is owned here and passed into each
/// connection handler; its lifetime is the service lifetime.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionBufferRegistry>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub connections: RwLock<HashMap<String, ConnectionState>>,
}

/// Per-connection state.
pub struct ConnectionState {
    pub conn_id: String,
    pub event_tx: mpsc::UnboundedSender<String>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>) -> Self {
        let orchestrator = Arc::new(PipelineOrchestrator::from_config(&config));
        Self {
            config,
            registry: Arc::new(SessionBufferRegistry::new()),
            orchestrator,
            connections: RwLock::new(HashMap::new()),
        }
    }
}
