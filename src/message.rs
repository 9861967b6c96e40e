// src/message.rs
use serde::{Deserialize, Serialize};

use crate::services::image_analysis::AnalysisSnapshot;
use crate::services::metrics_manager::MetricsData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry of a conversation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            suggestions,
        }
    }
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub outcome: String,
    pub reply: Option<Message>,
}

#[derive(Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub pending: bool,
    pub messages: Vec<Message>,
}

#[derive(Deserialize)]
pub struct AnalyzeBase64Request {
    pub session_id: Option<String>,
    pub image: String,
    /// `xray`, `ct` or `mri`; omitted means a general description.
    #[serde(default)]
    pub modality: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub analysis: AnalysisSnapshot,
}

#[derive(Deserialize)]
pub struct InitializeRequest {
    pub api_key: String,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub active_sessions: usize,
    pub model_ready: bool,
    pub metrics: MetricsData,
}
