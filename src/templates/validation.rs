use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::templates::types::{
    Category, ParsedTemplate, PlatformName, PlatformParameter, TemplateNormalized, TemplateRecord,
};

const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_PROMPT_INPUT_CHARS: usize = 1000;

/// A bracketed variable name such as `[subject]`.
pub static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("placeholder pattern is valid"));
static VARIABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("variable name pattern is valid"));
static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl ValidationIssue {
    fn new(field: &str, message: impl Into<String>, code: &str) -> Self {
        ValidationIssue {
            field: field.to_string(),
            message: message.into(),
            code: code.to_string(),
        }
    }
}

fn check_length(
    issues: &mut Vec<ValidationIssue>,
    field: &str,
    value: &str,
    max: Option<usize>,
    required_message: &str,
    too_long_message: &str,
) {
    let length = value.trim().chars().count();
    if length == 0 {
        issues.push(ValidationIssue::new(field, required_message, "too_small"));
    } else if let Some(max) = max {
        if length > max {
            issues.push(ValidationIssue::new(field, too_long_message, "too_big"));
        }
    }
}

/// Turns a raw record into a typed template, collecting every problem found.
pub fn validate_template(record: &TemplateRecord) -> Result<TemplateNormalized, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    if record.id.trim().is_empty() {
        issues.push(ValidationIssue::new("id", "Template id is required", "too_small"));
    }
    check_length(
        &mut issues,
        "name",
        &record.name,
        Some(MAX_NAME_CHARS),
        "Template name is required",
        "Template name too long",
    );
    check_length(
        &mut issues,
        "description",
        &record.description,
        Some(MAX_DESCRIPTION_CHARS),
        "Description is required",
        "Description too long",
    );
    check_length(
        &mut issues,
        "base_prompt",
        &record.base_prompt,
        None,
        "Base prompt is required",
        "",
    );

    let category = match record.category.parse::<Category>() {
        Ok(category) => Some(category),
        Err(_) => {
            let expected = Category::ALL
                .iter()
                .map(|category| format!("'{category}'"))
                .collect::<Vec<_>>()
                .join(" | ");
            issues.push(ValidationIssue::new(
                "category",
                format!(
                    "Invalid enum value. Expected {expected}, received '{}'",
                    record.category
                ),
                "invalid_enum_value",
            ));
            None
        }
    };

    match category {
        Some(category) if issues.is_empty() => Ok(TemplateNormalized {
            id: record.id.trim().to_string(),
            name: record.name.trim().to_string(),
            description: record.description.trim().to_string(),
            base_prompt: record.base_prompt.clone(),
            variables: record.variables.clone(),
            example_values: record.example_values.clone(),
            category,
        }),
        _ => Err(issues),
    }
}

pub fn validate_prompt_values(
    values: &HashMap<String, String>,
    template: &ParsedTemplate,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for variable in &template.variables {
        let missing = values
            .get(variable)
            .map(|value| value.trim().is_empty())
            .unwrap_or(true);
        if missing {
            issues.push(ValidationIssue::new(
                variable,
                format!("Value for {variable} is required"),
                "required",
            ));
        }
    }

    let mut extra_keys = values
        .keys()
        .filter(|key| !template.variables.contains(*key))
        .collect::<Vec<_>>();
    extra_keys.sort();
    for key in extra_keys {
        issues.push(ValidationIssue::new(
            key,
            format!("{key} is not a valid variable for this template"),
            "invalid",
        ));
    }

    issues
}

pub fn validate_platform_params(
    parameter: &PlatformParameter,
    platform: PlatformName,
) -> Vec<ValidationIssue> {
    match (platform, parameter) {
        (PlatformName::Midjourney, PlatformParameter::Text(_)) => Vec::new(),
        (PlatformName::Midjourney, PlatformParameter::Structured(_)) => vec![ValidationIssue::new(
            "parameters",
            "Midjourney parameters must be a string",
            "invalid_type",
        )],
        (_, PlatformParameter::Structured(_)) => Vec::new(),
        (_, PlatformParameter::Text(text)) => {
            if serde_json::from_str::<serde_json::Value>(text).is_ok() {
                Vec::new()
            } else {
                vec![ValidationIssue::new(
                    "parameters",
                    "Invalid JSON format for parameters",
                    "invalid_json",
                )]
            }
        }
    }
}

/// Placeholder names in first-seen order, without duplicates.
pub fn extract_variables_from_prompt(prompt: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(prompt) {
        let name = &caps[1];
        if !variables.iter().any(|existing| existing == name) {
            variables.push(name.to_string());
        }
    }
    variables
}

pub fn is_valid_variable_name(name: &str) -> bool {
    VARIABLE_NAME_RE.is_match(name)
}

pub fn sanitize_prompt_input(input: &str) -> String {
    let collapsed = WHITESPACE_RE.replace_all(input.trim(), " ");
    collapsed
        .chars()
        .filter(|ch| *ch != '<' && *ch != '>')
        .take(MAX_PROMPT_INPUT_CHARS)
        .collect()
}
