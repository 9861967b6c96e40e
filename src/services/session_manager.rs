// src/services/session_manager.rs
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::{
    message::Message,
    services::{
        chat_session::ChatSession, image_analysis::ImageAnalysisService,
        metrics_manager::MetricsManager, model_client::RemoteModelClient, topic::ChatPolicy,
    },
};

/// The chat and analysis state belonging to one client.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub chat: ChatSession,
    pub analysis: ImageAnalysisService,
    pub last_active: Instant,
}

impl Session {
    async fn cancel(&self) {
        self.chat.cancel().await;
        self.analysis.cancel().await;
    }
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
    model: Arc<RemoteModelClient>,
    policy: ChatPolicy,
    metrics: MetricsManager,
}

impl Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl SessionManager {
    pub fn new(
        ttl: Duration,
        model: Arc<RemoteModelClient>,
        policy: ChatPolicy,
        metrics: MetricsManager,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            model,
            policy,
            metrics,
        }
    }

    fn new_session(&self, id: String) -> Session {
        Session {
            id,
            chat: ChatSession::new(self.model.clone(), self.policy, self.metrics.clone()),
            analysis: ImageAnalysisService::new(self.model.clone(), self.metrics.clone()),
            last_active: Instant::now(),
        }
    }

    // Create a fresh session and return it.
    pub async fn create_session(&self) -> Session {
        let id = Uuid::new_v4().to_string();
        let session = self.new_session(id.clone());

        let mut guard = self.inner.write().await;
        guard.insert(id, session.clone());
        session
    }

    // Fetch an existing session and touch last_active.
    pub async fn touch(&self, id: &str) -> Option<Session> {
        let mut guard = self.inner.write().await;
        let session = guard.get_mut(id)?;
        session.last_active = Instant::now();
        Some(session.clone())
    }

    pub fn welcome(&self) -> Message {
        self.policy.welcome()
    }

    /// Session for an optional client-supplied id. A missing or blank id gets
    /// a new session; an id the server never issued yields `None`.
    pub async fn resolve(&self, id: Option<&str>) -> Option<Session> {
        match id.map(str::trim) {
            Some(id) if !id.is_empty() => self.touch(id).await,
            _ => Some(self.create_session().await),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        let guard = self.inner.read().await;
        guard.get(id).cloned()
    }

    /// Get a copy of the session history
    pub async fn get_history(&self, session_id: &str) -> Option<Vec<Message>> {
        let session = self.get(session_id).await?;
        Some(session.chat.history().await)
    }

    /// Remove a session by id, cancelling anything it still has in flight
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.inner.write().await.remove(session_id);
        match removed {
            Some(session) => {
                session.cancel().await;
                true
            }
            None => false,
        }
    }

    /// Remove sessions idle longer than ttl. Returns number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Session> = {
            let mut guard = self.inner.write().await;
            let ids: Vec<String> = guard
                .iter()
                .filter(|(_, s)| now.duration_since(s.last_active) >= self.ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| guard.remove(id)).collect()
        };
        for session in &expired {
            session.cancel().await;
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "purged idle sessions");
        }
        expired.len()
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        let guard = self.inner.read().await;
        guard.len()
    }

    /// List session ids
    pub async fn list_session_ids(&self) -> Vec<String> {
        let guard = self.inner.read().await;
        guard.keys().cloned().collect()
    }
}
