use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-3.5-turbo";
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_NOTION_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2025-09-03";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    pub notion_api_key: String,
    pub notion_database_id: String,
    pub notion_base_url: String,
    pub notion_version: String,
    pub template_data_dir: PathBuf,
}

fn env_string<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).unwrap_or_else(|| default.to_string())
}

fn env_trimmed<F>(lookup: &F, name: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

fn env_u16<F>(lookup: &F, name: &'static str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidValue {
                name,
                expected: "u16",
                value,
            }),
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.trim().to_string()
    }
}

/// Loose shape check for provider keys; mismatches only produce warnings.
pub fn looks_like_api_key(key: &str, provider: &str) -> bool {
    let key = key.trim();
    if key.is_empty() {
        return false;
    }
    match provider {
        "openrouter" => key.starts_with("sk-or-v1-"),
        "notion" => key.starts_with("secret_") || key.starts_with("ntn_"),
        _ => false,
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            host: non_empty_or(env_string(&lookup, "HOST", "0.0.0.0"), "0.0.0.0"),
            port: env_u16(&lookup, "PORT", 3000)?,
            log_level: env_string(&lookup, "LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(non_empty_or(env_string(&lookup, "LOG_DIR", "logs"), "logs")),
            openrouter_api_key: env_trimmed(&lookup, "OPENROUTER_API_KEY"),
            openrouter_model: non_empty_or(
                env_string(&lookup, "OPENROUTER_MODEL", DEFAULT_OPENROUTER_MODEL),
                DEFAULT_OPENROUTER_MODEL,
            ),
            openrouter_base_url: non_empty_or(
                env_string(&lookup, "OPENROUTER_BASE_URL", DEFAULT_OPENROUTER_BASE_URL),
                DEFAULT_OPENROUTER_BASE_URL,
            ),
            notion_api_key: env_trimmed(&lookup, "NOTION_API_KEY"),
            notion_database_id: env_trimmed(&lookup, "NOTION_DATABASE_ID"),
            notion_base_url: non_empty_or(
                env_string(&lookup, "NOTION_BASE_URL", DEFAULT_NOTION_BASE_URL),
                DEFAULT_NOTION_BASE_URL,
            ),
            notion_version: non_empty_or(
                env_string(&lookup, "NOTION_VERSION", DEFAULT_NOTION_VERSION),
                DEFAULT_NOTION_VERSION,
            ),
            template_data_dir: PathBuf::from(non_empty_or(
                env_string(&lookup, "TEMPLATE_DATA_DIR", "data/normalized"),
                "data/normalized",
            )),
        };
        Ok(config)
    }

    pub fn notion_enabled(&self) -> bool {
        !self.notion_api_key.is_empty() && !self.notion_database_id.is_empty()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Called after logging is up so the warnings are actually recorded.
    pub fn log_warnings(&self) {
        if self.openrouter_api_key.is_empty() {
            warn!("OPENROUTER_API_KEY is not set; /api/enhance will fail until it is configured");
        } else if !looks_like_api_key(&self.openrouter_api_key, "openrouter") {
            warn!("OPENROUTER_API_KEY does not look like an OpenRouter key (expected 'sk-or-v1-' prefix)");
        }

        if self.notion_api_key.is_empty() != self.notion_database_id.is_empty() {
            warn!("Notion is only used when both NOTION_API_KEY and NOTION_DATABASE_ID are set");
        }
        if !self.notion_api_key.is_empty() && !looks_like_api_key(&self.notion_api_key, "notion") {
            warn!("NOTION_API_KEY does not look like a Notion integration token");
        }
    }
}

pub const ENHANCE_SYSTEM_PROMPT: &str = r#"You are an expert prompt engineer specializing in AI image generation. Your task is to enhance user prompts to create stunning, detailed images.

Guidelines for enhancement:
- Add specific visual details: lighting, composition, style, mood
- Include technical photography/art terms: depth of field, lighting techniques, camera angles
- Mention artistic styles or references when relevant
- Add quality modifiers: "highly detailed", "8k", "photorealistic", "cinematic"
- Be specific about colors, textures, and atmosphere
- Keep the core concept intact while adding rich descriptive details

Return ONLY the enhanced prompt, no explanations."#;

pub fn enhance_user_prompt(combined_prompt: &str) -> String {
    format!("Enhance this prompt for an AI image generator:\n\n\"{combined_prompt}\"")
}
