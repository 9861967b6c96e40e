// src/routes/mod.rs
pub mod admin;
pub mod analysis;
pub mod chat;

use crate::state::SharedState;
use admin::{auth_middleware, initialize_model_handler, list_sessions_handler};
use analysis::{analysis_handler, analyze_base64_handler, analyze_upload_handler};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use chat::{
    chat_handler, dashboard_handler, delete_session_handler, get_metrics_handler, history_handler,
    welcome_handler,
};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
// Base64 inflates by 4/3; leave room for the JSON envelope and data-url prefix.
const MAX_BASE64_BODY_BYTES: usize = MAX_UPLOAD_BYTES * 4 / 3 + 1024;

pub fn create_router(state: &SharedState) -> Router<SharedState> {
    let admin_routes = Router::new()
        .route("/metrics", get(get_metrics_handler))
        .route("/sessions", get(list_sessions_handler))
        .route("/model/initialize", post(initialize_model_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let analyze_routes = Router::new()
        .route(
            "/analyze",
            post(analyze_upload_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/analyze/base64",
            post(analyze_base64_handler).layer(DefaultBodyLimit::max(MAX_BASE64_BODY_BYTES)),
        );

    let api_routes = Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/welcome", get(welcome_handler))
        .route("/chat/{session_id}", get(history_handler))
        .route("/analyze/{session_id}", get(analysis_handler))
        .route("/sessions/{session_id}", delete(delete_session_handler))
        .route("/dashboard", get(dashboard_handler))
        .merge(analyze_routes);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/admin", admin_routes)
        .route("/health", get(|| async { "OK" }))
        .fallback_service(ServeDir::new("public"))
        .layer(TraceLayer::new_for_http())
}
