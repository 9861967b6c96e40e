use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    error::AppError,
    message::{ChatRequest, ChatResponse, DashboardResponse, HistoryResponse, Message},
    services::{
        chat_session::{IgnoreReason, SendOutcome},
        metrics_manager::MetricsData,
    },
    state::SharedState,
};

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if payload.message.trim().is_empty() {
        return Err(AppError::BadRequest("Message cannot be empty".to_string()));
    }

    let session = state
        .sessions
        .resolve(payload.session_id.as_deref())
        .await
        .ok_or_else(|| unknown_session(payload.session_id.as_deref()))?;
    let outcome = session.chat.send(&payload.message).await;

    match outcome {
        SendOutcome::Ignored(IgnoreReason::Busy) => Err(AppError::Conflict(
            "A request is already pending for this session".to_string(),
        )),
        SendOutcome::Ignored(IgnoreReason::Empty) => {
            Err(AppError::BadRequest("Message cannot be empty".to_string()))
        }
        outcome => Ok(Json(ChatResponse {
            session_id: session.id,
            outcome: outcome.label().to_string(),
            reply: outcome.reply().cloned(),
        })),
    }
}

pub(crate) fn unknown_session(id: Option<&str>) -> AppError {
    AppError::NotFound(format!("Unknown session {}", id.unwrap_or_default().trim()))
}

pub async fn welcome_handler(State(state): State<SharedState>) -> Json<Message> {
    Json(state.sessions.welcome())
}

pub async fn history_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown session {session_id}")))?;

    Ok(Json(HistoryResponse {
        session_id,
        pending: session.chat.is_pending().await,
        messages: session.chat.history().await,
    }))
}

pub async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.sessions.remove_session(&session_id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn dashboard_handler(State(state): State<SharedState>) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        active_sessions: state.sessions.len().await,
        model_ready: state.model.is_initialized().await,
        metrics: state.metrics.get_metrics().await,
    })
}

pub async fn get_metrics_handler(State(state): State<SharedState>) -> Json<MetricsData> {
    Json(state.metrics.get_metrics().await)
}
