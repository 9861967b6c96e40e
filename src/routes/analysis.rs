use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
};

use crate::{
    error::AppError,
    message::{AnalysisResponse, AnalyzeBase64Request},
    routes::chat::unknown_session,
    services::{
        image::{ImageSource, UploadedImage},
        model_client::Modality,
    },
    state::SharedState,
};

fn bad_upload(err: MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid upload: {err}"))
}

fn parse_modality(raw: Option<&str>) -> Result<Option<Modality>, AppError> {
    match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => Ok(Some(raw.parse()?)),
        _ => Ok(None),
    }
}

// Multipart form: `file` (required, image/*), optional `session_id` and `modality`.
pub async fn analyze_upload_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AppError> {
    let mut session_id = None;
    let mut modality = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_upload)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("session_id") => session_id = Some(field.text().await.map_err(bad_upload)?),
            Some("modality") => modality = Some(field.text().await.map_err(bad_upload)?),
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_upload)?;
                upload = Some(UploadedImage::new(file_name, mime_type, bytes.to_vec())?);
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("Missing file field".to_string()))?;
    let modality = parse_modality(modality.as_deref())?;
    let session = state
        .sessions
        .resolve(session_id.as_deref())
        .await
        .ok_or_else(|| unknown_session(session_id.as_deref()))?;
    let analysis = session
        .analysis
        .analyze_with(ImageSource::Upload(upload), modality)
        .await;

    Ok(Json(AnalysisResponse {
        session_id: session.id,
        analysis,
    }))
}

pub async fn analyze_base64_handler(
    State(state): State<SharedState>,
    Json(payload): Json<AnalyzeBase64Request>,
) -> Result<Json<AnalysisResponse>, AppError> {
    if payload.image.trim().is_empty() {
        return Err(AppError::BadRequest("Image cannot be empty".to_string()));
    }

    let modality = parse_modality(payload.modality.as_deref())?;
    let session = state
        .sessions
        .resolve(payload.session_id.as_deref())
        .await
        .ok_or_else(|| unknown_session(payload.session_id.as_deref()))?;
    let analysis = session
        .analysis
        .analyze_with(ImageSource::DataUrl(payload.image), modality)
        .await;

    Ok(Json(AnalysisResponse {
        session_id: session.id,
        analysis,
    }))
}

pub async fn analysis_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Unknown session {session_id}")))?;

    Ok(Json(AnalysisResponse {
        analysis: session.analysis.snapshot().await,
        session_id,
    }))
}
