use std::sync::Arc;

use anyhow::Context;
use axum::{http::HeaderValue, routing::get};
use radiology_assistant::{
    config::Config, routes, services::model_client::RemoteModelClient, state::AppState,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("radiology_assistant=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let model = Arc::new(RemoteModelClient::new(config.model.clone()));
    match config.api_key.as_deref() {
        Some(key) => model.initialize(key).await?,
        None => warn!("GEMINI_API_KEY not set, chat and analysis will fail until initialized"),
    }

    let state = Arc::new(
        AppState::new(model, config.policy(), config.session_ttl)
            .with_admin_key(config.admin_key.clone()),
    );

    let sessions = state.sessions.clone();
    let purge_interval = config.purge_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        loop {
            ticker.tick().await;
            sessions.purge_expired().await;
        }
    });

    let cors = if config.allows_any_origin() {
        CorsLayer::very_permissive()
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o).ok())
            .collect::<Vec<_>>();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::create_router(&state)
        .route("/", get(|| async { "Radiology Assistant API" }))
        .with_state(state)
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;

    info!("radiology assistant running at http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
