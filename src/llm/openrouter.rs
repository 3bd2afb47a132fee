use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("OPENROUTER_API_KEY is not configured")]
    MissingApiKey,
    #[error("OpenRouter request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("OpenRouter API error: {status} {body}")]
    Upstream { status: u16, body: String },
    #[error("OpenRouter response missing choices[0].message.content: {0}")]
    MalformedResponse(String),
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let roles = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| {
            messages
                .iter()
                .filter_map(|message| message.get("role").and_then(|v| v.as_str()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    format!("model={}, messages=[{}]", model, roles.join(","))
}

fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(message) = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("message").and_then(|v| v.as_str()))
        {
            return truncate_for_log(message, 2000);
        }
        return truncate_for_log(&value.to_string(), 2000);
    }

    truncate_for_log(trimmed, 2000)
}

pub fn build_chat_payload(model: &str, system_prompt: &str, user_prompt: &str) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt }
        ]
    })
}

pub fn extract_completion_text(response: &Value) -> Result<String, LlmError> {
    response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LlmError::MalformedResponse(truncate_for_log(&response.to_string(), 500)))
}

#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn new(http: Client, base_url: &str, api_key: &str, model: &str) -> Self {
        OpenRouterClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        OpenRouterClient::new(
            get_http_client().clone(),
            &config.openrouter_base_url,
            &config.openrouter_api_key,
            &config.openrouter_model,
        )
    }

    async fn call_api(&self, payload: &Value) -> Result<Value, LlmError> {
        debug!("OpenRouter request: {}", summarize_payload(payload));

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "OpenRouter API error: status={}, body={}",
                status,
                summarize_error_body(&body)
            );
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let value = response.json::<Value>().await?;
        debug!("OpenRouter response received for model={}", self.model);
        Ok(value)
    }

    /// One system message and one user message; no retries.
    pub async fn enhance(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let payload = build_chat_payload(&self.model, system_prompt, user_prompt);
        log_llm_timing("openrouter", &self.model, "openrouter:enhance", None, || async {
            let response = self.call_api(&payload).await?;
            extract_completion_text(&response)
        })
        .await
    }
}
