// src/state.rs
use std::sync::Arc;
use std::time::Duration;

use crate::services::metrics_manager::MetricsManager;
use crate::services::model_client::RemoteModelClient;
use crate::services::session_manager::SessionManager;
use crate::services::topic::ChatPolicy;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub sessions: SessionManager,
    pub metrics: MetricsManager,
    pub model: Arc<RemoteModelClient>,
    pub admin_key: Option<String>,
}

impl AppState {
    pub fn new(model: Arc<RemoteModelClient>, policy: ChatPolicy, session_ttl: Duration) -> Self {
        let metrics = MetricsManager::new();
        Self {
            sessions: SessionManager::new(session_ttl, model.clone(), policy, metrics.clone()),
            metrics,
            model,
            admin_key: None,
        }
    }

    pub fn with_admin_key(mut self, key: Option<String>) -> Self {
        self.admin_key = key;
        self
    }
}
