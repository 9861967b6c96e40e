use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{error::AppError, message::InitializeRequest, state::SharedState};

pub async fn auth_middleware(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Admin key check. Without a configured key the admin routes stay closed.
    let Some(expected) = state.admin_key.as_deref() else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    match req.headers().get("x-admin-key") {
        Some(val) if val.as_bytes() == expected.as_bytes() => Ok(next.run(req).await),
        _ => {
            warn!(path = %req.uri().path(), "rejected admin request");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

pub async fn list_sessions_handler(State(state): State<SharedState>) -> Json<Vec<String>> {
    let mut ids = state.sessions.list_session_ids().await;
    ids.sort();
    Json(ids)
}

// Replaces the model client's credentials at runtime.
pub async fn initialize_model_handler(
    State(state): State<SharedState>,
    Json(payload): Json<InitializeRequest>,
) -> Result<Json<Value>, AppError> {
    state.model.initialize(&payload.api_key).await?;
    info!("model client re-initialized through admin api");
    Ok(Json(json!({ "initialized": true })))
}
