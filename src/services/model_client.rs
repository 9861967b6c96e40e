// src/services/model_client.rs
use std::{fmt::Debug, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    error::{ImageError, ModelError},
    message::{Message, MessageRole},
    services::image::ImagePayload,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_VISION_MODEL: &str = "gemini-1.5-flash";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are an AI radiology assistant. You help with \
medical imaging questions: imaging protocol selection, scan interpretation guidelines, \
radiation safety and diagnostic recommendations. Answer in markdown with short sections. \
Remind the user that your answers do not replace a radiologist's report.";

const DEFAULT_ANALYSIS_PROMPT: &str = "Describe this medical image. Identify the imaging \
modality and body region, list notable findings and possible abnormalities, and suggest \
follow-up imaging where relevant.";

const XRAY_ANALYSIS_PROMPT: &str = "Describe this radiograph. Identify the projection and \
body region, assess bones, joints, soft tissues and, for chest films, the lungs, heart and \
mediastinum. List notable findings and suggest follow-up imaging where relevant.";

const CT_ANALYSIS_PROMPT: &str = "Describe this CT image. Identify the body region, the plane \
and whether contrast appears to be used. Comment on attenuation differences, masses, \
hemorrhage or fluid collections, and suggest follow-up imaging where relevant.";

const MRI_ANALYSIS_PROMPT: &str = "Describe this MRI image. Identify the body region, the \
plane and the likely sequence (T1, T2, FLAIR or diffusion). Comment on signal abnormalities, \
masses or edema, and suggest follow-up imaging where relevant.";

/// Imaging modality of an uploaded study; picks the analysis instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Modality {
    Xray,
    Ct,
    Mri,
}

impl Modality {
    pub fn prompt(self) -> &'static str {
        match self {
            Modality::Xray => XRAY_ANALYSIS_PROMPT,
            Modality::Ct => CT_ANALYSIS_PROMPT,
            Modality::Mri => MRI_ANALYSIS_PROMPT,
        }
    }
}

impl FromStr for Modality {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xray" | "x-ray" => Ok(Modality::Xray),
            "ct" => Ok(Modality::Ct),
            "mri" => Ok(Modality::Mri),
            other => Err(ImageError::UnsupportedModality(other.to_string())),
        }
    }
}

/// Sampling parameters sent with every chat request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

/// Ships a generate request to a model and hands back its text.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, ModelError>;
}

/// Gemini REST transport (`models/{model}:generateContent`).
pub struct GeminiTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::MissingApiKey);
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Transport for GeminiTransport {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        debug!(%url, turns = request.contents.len(), "sending generate request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(200).collect();
            return Err(ModelError::RemoteCall(format!("{status}: {body}")));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.text())
    }
}

#[derive(Clone, Debug)]
pub struct ModelSettings {
    pub base_url: String,
    pub chat_model: String,
    pub vision_model: String,
    pub generation: GenerationConfig,
    pub system_instruction: Option<String>,
    pub analysis_prompt: String,
    pub timeout: Option<Duration>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            generation: GenerationConfig::default(),
            system_instruction: Some(DEFAULT_SYSTEM_INSTRUCTION.to_string()),
            analysis_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
            timeout: None,
        }
    }
}

/// Handle to the hosted model. Starts uninitialized; every call made before
/// `initialize` fails with [`ModelError::Uninitialized`].
pub struct RemoteModelClient {
    transport: RwLock<Option<Arc<dyn Transport>>>,
    settings: ModelSettings,
}

impl Debug for RemoteModelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteModelClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl RemoteModelClient {
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            transport: RwLock::new(None),
            settings,
        }
    }

    /// Builds the Gemini transport for `api_key`. Calling it again replaces
    /// the previous transport.
    pub async fn initialize(&self, api_key: &str) -> Result<(), ModelError> {
        let transport = GeminiTransport::new(
            api_key,
            self.settings.base_url.clone(),
            self.settings.timeout,
        )?;
        self.initialize_with(Arc::new(transport)).await;
        info!(base_url = %self.settings.base_url, "model client initialized");
        Ok(())
    }

    pub async fn initialize_with(&self, transport: Arc<dyn Transport>) {
        *self.transport.write().await = Some(transport);
    }

    pub async fn is_initialized(&self) -> bool {
        self.transport.read().await.is_some()
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    async fn transport(&self) -> Result<Arc<dyn Transport>, ModelError> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or(ModelError::Uninitialized)
    }

    /// Sends `prompt` after the prior `history` and returns the reply text.
    pub async fn chat(&self, prompt: &str, history: &[Message]) -> Result<String, ModelError> {
        let transport = self.transport().await?;

        let mut contents: Vec<Content> = history
            .iter()
            .map(|m| text_content(wire_role(m.role), &m.content))
            .collect();
        contents.push(text_content("user", prompt));

        let request = GenerateRequest {
            contents,
            system_instruction: self.settings.system_instruction.as_deref().map(|s| Content {
                role: None,
                parts: vec![Part::Text(s.to_string())],
            }),
            generation_config: Some(self.settings.generation),
        };

        let text = transport.generate(&self.settings.chat_model, &request).await?;
        non_empty(text)
    }

    /// Describes an image given as base64, with or without a data-url prefix.
    pub async fn analyze_image(&self, base64_payload: &str) -> Result<String, ModelError> {
        self.analyze_image_as(base64_payload, None).await
    }

    /// Like [`analyze_image`](Self::analyze_image), with the instruction for
    /// `modality` instead of the general one.
    pub async fn analyze_image_as(
        &self,
        base64_payload: &str,
        modality: Option<Modality>,
    ) -> Result<String, ModelError> {
        let transport = self.transport().await?;
        let payload = ImagePayload::from_base64(base64_payload)
            .map_err(|e| ModelError::InvalidPayload(e.to_string()))?;
        debug!(
            mime_type = %payload.mime_type,
            bytes = payload.bytes.len(),
            ?modality,
            "analyzing image"
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::InlineData(InlineData {
                        mime_type: payload.mime_type.clone(),
                        data: payload.to_base64(),
                    }),
                    Part::Text(
                        modality
                            .map(Modality::prompt)
                            .unwrap_or(self.settings.analysis_prompt.as_str())
                            .to_string(),
                    ),
                ],
            }],
            system_instruction: None,
            generation_config: None,
        };

        let text = transport.generate(&self.settings.vision_model, &request).await?;
        non_empty(text)
    }
}

fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "model",
    }
}

fn text_content(role: &str, text: &str) -> Content {
    Content {
        role: Some(role.to_string()),
        parts: vec![Part::Text(text.to_string())],
    }
}

fn non_empty(text: String) -> Result<String, ModelError> {
    if text.trim().is_empty() {
        Err(ModelError::RemoteCall("model returned no text".to_string()))
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_in_gemini_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::Text("hi".to_string()),
                    Part::InlineData(InlineData {
                        mime_type: "image/png".to_string(),
                        data: "AQID".to_string(),
                    }),
                ],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig::default()),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "hi" },
                        { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
                    ]
                }],
                "generationConfig": {
                    "temperature": 0.7f32,
                    "topP": 0.95f32,
                    "topK": 40,
                    "maxOutputTokens": 1024
                }
            })
        );
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Normal " }, { "text": "chest film." }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(body.text(), "Normal chest film.");

        let empty: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.text(), "");
    }

    #[test]
    fn modality_parses_common_spellings() {
        assert_eq!("X-Ray".parse::<Modality>().unwrap(), Modality::Xray);
        assert_eq!(" ct ".parse::<Modality>().unwrap(), Modality::Ct);
        assert_eq!("mri".parse::<Modality>().unwrap(), Modality::Mri);
        assert!(matches!(
            "pet".parse::<Modality>(),
            Err(ImageError::UnsupportedModality(_))
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            GeminiTransport::new("  ", DEFAULT_BASE_URL, None),
            Err(ModelError::MissingApiKey)
        ));
    }
}
