use std::collections::HashMap;

use regex::Captures;

use crate::templates::types::{PlatformName, PlatformParameter, PlatformParams};
use crate::templates::validation::PLACEHOLDER_RE;

/// Replaces every `[name]` that has a value in one pass, so substituted text
/// is never scanned again. Unknown placeholders stay verbatim.
pub fn substitute(base_prompt: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(base_prompt, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

pub fn combine_with_guidance(guidance: Option<&str>, filled_prompt: &str) -> String {
    match guidance.map(str::trim).filter(|value| !value.is_empty()) {
        Some(guidance) => format!("{guidance}, {filled_prompt}"),
        None => filled_prompt.to_string(),
    }
}

pub fn render_parameter_flags(parameter: &PlatformParameter) -> Option<String> {
    match parameter {
        PlatformParameter::Text(text) => Some(text.clone()),
        PlatformParameter::Structured(map) if map.is_empty() => None,
        PlatformParameter::Structured(map) => Some(
            map.iter()
                .map(|(key, value)| format!("--{key} {value}"))
                .collect::<Vec<_>>()
                .join(" "),
        ),
    }
}

/// Appends the platform's parameters only when the stored value has the
/// shape that platform expects; anything else leaves the prompt untouched.
pub fn apply_platform_parameters(
    prompt: &str,
    platform: Option<&str>,
    platform_params: Option<&PlatformParams>,
) -> String {
    let (Some(platform), Some(params)) = (platform, platform_params) else {
        return prompt.to_string();
    };
    let Ok(platform) = platform.parse::<PlatformName>() else {
        return prompt.to_string();
    };
    let Some(parameter) = params.get(platform) else {
        return prompt.to_string();
    };

    let expected_shape = matches!(
        (platform, parameter),
        (PlatformName::Midjourney, PlatformParameter::Text(_))
            | (
                PlatformName::StableDiffusion | PlatformName::Flux,
                PlatformParameter::Structured(_)
            )
    );
    if !expected_shape {
        return prompt.to_string();
    }

    match render_parameter_flags(parameter) {
        Some(flags) if !flags.trim().is_empty() => format!("{prompt} {flags}"),
        _ => prompt.to_string(),
    }
}
