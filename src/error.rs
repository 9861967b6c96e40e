// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures of the remote model client.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model client is not initialized")]
    Uninitialized,
    #[error("model client requires a non-empty API key")]
    MissingApiKey,
    #[error("remote call failed: {0}")]
    RemoteCall(String),
    #[error("invalid image payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::RemoteCall(err.to_string())
    }
}

/// Failures while turning an upload into something the model accepts.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("could not read image: {0}")]
    Read(#[from] std::io::Error),
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("unsupported imaging modality: {0}")]
    UnsupportedModality(String),
    #[error("malformed data url: {0}")]
    InvalidDataUrl(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("{key} must be true or false, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Image(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Model(ModelError::MissingApiKey) => StatusCode::BAD_REQUEST,
            AppError::Model(ModelError::Uninitialized) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Model(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
