// src/services/image.rs
use std::path::{Path, PathBuf};

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::ImageError;

/// Mime type assumed when a payload arrives without a data-url prefix.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// A file handed over by the client. Only lives for the request that consumes it.
#[derive(Clone, Debug)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    /// Rejects anything that is not an `image/*` upload.
    pub fn new(
        file_name: Option<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let mime_type = mime_type.into().to_ascii_lowercase();
        if !mime_type.starts_with("image/") {
            return Err(ImageError::UnsupportedType(mime_type));
        }
        Ok(Self { file_name, mime_type, bytes })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

/// Where an image to analyze comes from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Upload(UploadedImage),
    Path(PathBuf),
    DataUrl(String),
}

impl ImageSource {
    /// Reads the source into a base64 data url.
    pub async fn read_data_url(self) -> Result<String, ImageError> {
        match self {
            ImageSource::Upload(image) => Ok(image.to_data_url()),
            ImageSource::Path(path) => {
                let mime_type = mime_from_path(&path)?;
                let bytes = tokio::fs::read(&path).await?;
                let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                Ok(UploadedImage::new(file_name, mime_type, bytes)?.to_data_url())
            }
            ImageSource::DataUrl(url) => {
                let (mime_type, _) = split_data_url(&url)?;
                if !mime_type.starts_with("image/") {
                    return Err(ImageError::UnsupportedType(mime_type));
                }
                Ok(url)
            }
        }
    }
}

/// Decoded image ready to be sent as inline data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    /// Strips an optional `data:<mime>;base64,` prefix and decodes the rest.
    pub fn from_base64(payload: &str) -> Result<Self, ImageError> {
        let (mime_type, data) = split_data_url(payload)?;
        let bytes = STANDARD
            .decode(data)
            .map_err(|e| ImageError::InvalidDataUrl(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ImageError::InvalidDataUrl("empty image".to_string()));
        }
        Ok(Self { mime_type, bytes })
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Splits a payload into its mime type and raw base64 body.
pub fn split_data_url(payload: &str) -> Result<(String, &str), ImageError> {
    let payload = payload.trim();
    let Some(rest) = payload.strip_prefix("data:") else {
        return Ok((DEFAULT_MIME_TYPE.to_string(), payload));
    };
    let (mime_type, data) = rest
        .split_once(";base64,")
        .ok_or_else(|| ImageError::InvalidDataUrl("missing ;base64, marker".to_string()))?;
    let mime_type = if mime_type.is_empty() {
        DEFAULT_MIME_TYPE.to_string()
    } else {
        mime_type.to_ascii_lowercase()
    };
    Ok((mime_type, data))
}

fn mime_from_path(path: &Path) -> Result<&'static str, ImageError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        "bmp" => Ok("image/bmp"),
        other => Err(ImageError::UnsupportedType(format!(".{other}"))),
    }
}
