use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{enhance_user_prompt, ENHANCE_SYSTEM_PROMPT};
use crate::llm::openrouter::{LlmError, OpenRouterClient};
use crate::prompt::assembly::{apply_platform_parameters, combine_with_guidance, substitute};
use crate::templates::combine::json_to_param_value;
use crate::templates::types::{PlatformName, PlatformParameter, PlatformParams};
use crate::templates::validation::sanitize_prompt_input;

pub const MISSING_FIELDS_MESSAGE: &str = "base_prompt and promptValues are required";

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnhanceRequest {
    #[serde(default)]
    pub base_prompt: Option<String>,
    #[serde(rename = "promptValues", default)]
    pub prompt_values: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(rename = "platformParams", default)]
    pub platform_params: Option<Value>,
    #[serde(rename = "naturalLanguagePrompt", default)]
    pub natural_language_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnhanceResponse {
    #[serde(rename = "enhancedPrompt")]
    pub enhanced_prompt: String,
    #[serde(rename = "originalPrompt")]
    pub original_prompt: String,
    pub platform: String,
}

/// The assembled text sent for enhancement, plus what is applied afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPrompt {
    pub combined: String,
    pub platform: Option<String>,
    pub platform_params: Option<PlatformParams>,
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Strings pass through, null is empty, other JSON keeps its text form.
pub fn prompt_values_to_text(values: HashMap<String, Value>) -> HashMap<String, String> {
    values
        .into_iter()
        .map(|(key, value)| (key, value_to_text(value)))
        .collect()
}

/// Request-side parameters arrive as arbitrary JSON. Strings stay text,
/// objects become structured maps, anything else is dropped.
pub fn platform_params_from_json(value: &Value) -> PlatformParams {
    let mut params = PlatformParams::default();
    let Some(map) = value.as_object() else {
        return params;
    };

    for platform in PlatformName::ALL {
        let parameter = match map.get(platform.as_str()) {
            Some(Value::String(text)) => PlatformParameter::Text(text.clone()),
            Some(Value::Object(fields)) => PlatformParameter::Structured(
                fields
                    .iter()
                    .filter_map(|(key, value)| {
                        json_to_param_value(value.clone()).map(|value| (key.clone(), value))
                    })
                    .collect(),
            ),
            _ => continue,
        };
        params.set(platform, parameter);
    }
    params
}

/// Checks the required fields, substitutes values and prepends the
/// sanitized guidance.
pub fn prepare_prompt(request: EnhanceRequest) -> Result<PreparedPrompt, EnhanceError> {
    let base_prompt = request
        .base_prompt
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| EnhanceError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_string()))?;
    let prompt_values = request
        .prompt_values
        .ok_or_else(|| EnhanceError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_string()))?;

    let values = prompt_values_to_text(prompt_values);
    let filled = substitute(&base_prompt, &values);

    let guidance = request
        .natural_language_prompt
        .as_deref()
        .map(sanitize_prompt_input);
    let combined = combine_with_guidance(guidance.as_deref(), &filled);

    Ok(PreparedPrompt {
        combined,
        platform: request
            .platform
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        platform_params: request
            .platform_params
            .as_ref()
            .map(platform_params_from_json),
    })
}

#[derive(Debug, Clone)]
pub struct PromptEnhancer {
    client: OpenRouterClient,
}

impl PromptEnhancer {
    pub fn new(client: OpenRouterClient) -> Self {
        PromptEnhancer { client }
    }

    pub async fn enhance(&self, request: EnhanceRequest) -> Result<EnhanceResponse, EnhanceError> {
        let prepared = prepare_prompt(request)?;
        debug!("Enhancing prompt: {}", prepared.combined);

        let enhanced = self
            .client
            .enhance(ENHANCE_SYSTEM_PROMPT, &enhance_user_prompt(&prepared.combined))
            .await?;

        let final_prompt = apply_platform_parameters(
            &enhanced,
            prepared.platform.as_deref(),
            prepared.platform_params.as_ref(),
        );
        info!(
            "Enhanced prompt for platform {}",
            prepared.platform.as_deref().unwrap_or("none")
        );

        Ok(EnhanceResponse {
            enhanced_prompt: final_prompt,
            original_prompt: prepared.combined,
            platform: prepared.platform.unwrap_or_else(|| "none".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn request(body: Value) -> EnhanceRequest {
        serde_json::from_value(body).unwrap()
    }

    fn enhancer(server: &mockito::Server, api_key: &str) -> PromptEnhancer {
        PromptEnhancer::new(OpenRouterClient::new(
            reqwest::Client::new(),
            &server.url(),
            api_key,
            "openai/gpt-3.5-turbo",
        ))
    }

    #[test]
    fn missing_fields_are_rejected() {
        let err = prepare_prompt(request(json!({ "promptValues": {} }))).unwrap_err();
        assert_eq!(err.to_string(), MISSING_FIELDS_MESSAGE);

        let err = prepare_prompt(request(json!({ "base_prompt": "a [x]" }))).unwrap_err();
        assert!(matches!(err, EnhanceError::InvalidRequest(_)));
    }

    #[test]
    fn prepares_combined_prompt_with_sanitized_guidance() {
        let prepared = prepare_prompt(request(json!({
            "base_prompt": "a [animal] in [style]",
            "promptValues": { "animal": "fox", "style": "watercolor" },
            "naturalLanguagePrompt": "  make it <i>moody</i>  "
        })))
        .unwrap();

        assert_eq!(prepared.combined, "make it imoody/i, a fox in watercolor");
        assert_eq!(prepared.platform, None);
    }

    #[test]
    fn non_string_prompt_values_are_stringified() {
        let prepared = prepare_prompt(request(json!({
            "base_prompt": "[count] cats",
            "promptValues": { "count": 3 }
        })))
        .unwrap();
        assert_eq!(prepared.combined, "3 cats");
    }

    #[test]
    fn request_platform_params_keep_their_shape() {
        let params = platform_params_from_json(&json!({
            "midjourney": "--ar 3:2",
            "flux": { "steps": 25, "seed": null },
            "stable_diffusion": 12,
            "dalle": "--ignored"
        }));

        assert_eq!(
            params.midjourney,
            Some(PlatformParameter::Text("--ar 3:2".to_string()))
        );
        let Some(PlatformParameter::Structured(flux)) = params.flux else {
            panic!("expected structured flux parameters");
        };
        assert_eq!(flux.keys().collect::<Vec<_>>(), vec!["steps"]);
        assert_eq!(params.stable_diffusion, None);
    }

    #[tokio::test]
    async fn enhances_and_appends_platform_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Json(json!({
                "model": "openai/gpt-3.5-turbo",
                "messages": [
                    { "role": "system", "content": ENHANCE_SYSTEM_PROMPT },
                    {
                        "role": "user",
                        "content": "Enhance this prompt for an AI image generator:\n\n\"a fox in watercolor\""
                    }
                ]
            })))
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"content":"A fox rendered in watercolor, highly detailed"}}]}"#,
            )
            .create_async()
            .await;

        let response = enhancer(&server, "sk-or-v1-test")
            .enhance(request(json!({
                "base_prompt": "a [animal] in [style]",
                "promptValues": { "animal": "fox", "style": "watercolor" },
                "platform": "midjourney",
                "platformParams": { "midjourney": "--ar 3:2" }
            })))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            response,
            EnhanceResponse {
                enhanced_prompt: "A fox rendered in watercolor, highly detailed --ar 3:2".to_string(),
                original_prompt: "a fox in watercolor".to_string(),
                platform: "midjourney".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn missing_platform_reports_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"A cat"}}]}"#)
            .create_async()
            .await;

        let response = enhancer(&server, "sk-or-v1-test")
            .enhance(request(json!({ "base_prompt": "a cat", "promptValues": {} })))
            .await
            .unwrap();

        assert_eq!(response.platform, "none");
        assert_eq!(response.enhanced_prompt, "A cat");
    }

    #[tokio::test]
    async fn missing_api_key_surfaces_llm_error() {
        let server = mockito::Server::new_async().await;
        let err = enhancer(&server, "")
            .enhance(request(json!({ "base_prompt": "a cat", "promptValues": {} })))
            .await
            .unwrap_err();
        assert!(matches!(err, EnhanceError::Llm(LlmError::MissingApiKey)));
    }
}
