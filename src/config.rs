// src/config.rs
use std::time::Duration;

use crate::{
    error::ConfigError,
    services::{model_client::ModelSettings, topic::ChatPolicy},
};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

/// Runtime settings, read from the environment (and `.env` via dotenvy).
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: ModelSettings,
    pub bind_addr: String,
    pub session_ttl: Duration,
    pub purge_interval: Duration,
    pub allowed_origins: Vec<String>,
    pub admin_key: Option<String>,
    pub topic_filter: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut model = ModelSettings::default();
        if let Some(url) = get("GEMINI_BASE_URL") {
            model.base_url = url;
        }
        if let Some(name) = get("GEMINI_CHAT_MODEL") {
            model.chat_model = name;
        }
        if let Some(name) = get("GEMINI_VISION_MODEL") {
            model.vision_model = name;
        }
        model.timeout = get("MODEL_TIMEOUT_SECS")
            .map(|v| parse_secs("MODEL_TIMEOUT_SECS", v))
            .transpose()?;

        let session_ttl = get("SESSION_TTL_SECS")
            .map(|v| parse_secs("SESSION_TTL_SECS", v))
            .transpose()?
            .unwrap_or(Duration::from_secs(DEFAULT_SESSION_TTL_SECS));
        let purge_interval = get("SESSION_PURGE_INTERVAL_SECS")
            .map(|v| parse_secs("SESSION_PURGE_INTERVAL_SECS", v))
            .transpose()?
            .unwrap_or(Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS));

        let allowed_origins = get("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let topic_filter = match get("TOPIC_FILTER") {
            None => true,
            Some(v) => parse_bool("TOPIC_FILTER", v)?,
        };

        Ok(Self {
            api_key: get("GEMINI_API_KEY"),
            model,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            session_ttl,
            purge_interval,
            allowed_origins,
            admin_key: get("ADMIN_API_KEY"),
            topic_filter,
        })
    }

    pub fn policy(&self) -> ChatPolicy {
        if self.topic_filter {
            ChatPolicy::radiology()
        } else {
            ChatPolicy::unfiltered()
        }
    }

    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_secs(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidNumber { key, value }),
    }
}

fn parse_bool(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool { key, value }),
    }
}
