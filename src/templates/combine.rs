use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;

use crate::templates::types::{
    DataDiagnostic, Keyword, ParamValue, ParsedTemplate, Platform, PlatformName,
    PlatformParameter, PlatformParams, TemplateKeyword, TemplateNormalized,
    TemplatePlatformParameters,
};
use crate::templates::validation::{
    extract_variables_from_prompt, is_valid_variable_name, validate_platform_params,
};

#[derive(Debug, Clone, Default)]
pub struct CombinedTemplates {
    pub templates: Vec<ParsedTemplate>,
    pub diagnostics: Vec<DataDiagnostic>,
}

pub fn parse_variables(variables: &str) -> Vec<String> {
    variables
        .split(',')
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .collect()
}

/// Explicit list first, then placeholders found in the prompt; no duplicates.
pub fn collect_variables(explicit: &str, base_prompt: &str) -> Vec<String> {
    let mut variables: Vec<String> = Vec::new();
    for name in parse_variables(explicit)
        .into_iter()
        .chain(extract_variables_from_prompt(base_prompt))
    {
        if !variables.contains(&name) {
            variables.push(name);
        }
    }
    variables
}

pub(crate) fn json_to_param_value(value: Value) -> Option<ParamValue> {
    match value {
        Value::Null => None,
        Value::Number(number) => Some(ParamValue::Number(number)),
        Value::String(text) => Some(ParamValue::Text(text)),
        other => Some(ParamValue::Text(other.to_string())),
    }
}

fn parse_json_object(text: &str) -> Option<IndexMap<String, ParamValue>> {
    let parsed = serde_json::from_str::<Value>(text).or_else(|_| {
        let normalized = text.replace("\\\"", "\"").replace("\"\"", "\"");
        serde_json::from_str::<Value>(&normalized)
    });
    match parsed {
        Ok(Value::Object(map)) => Some(
            map.into_iter()
                .filter_map(|(key, value)| json_to_param_value(value).map(|value| (key, value)))
                .collect(),
        ),
        _ => None,
    }
}

/// Midjourney text is never parsed; other platforms get best-effort JSON
/// and keep the raw text when it does not parse. Blank text yields `None`.
pub fn parse_platform_parameter(platform: PlatformName, text: &str) -> Option<PlatformParameter> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if platform == PlatformName::Midjourney {
        return Some(PlatformParameter::Text(trimmed.to_string()));
    }

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Some(map) = parse_json_object(trimmed) {
            return Some(PlatformParameter::Structured(map));
        }
    }
    Some(PlatformParameter::Text(trimmed.to_string()))
}

pub fn build_parsed_template(
    template: TemplateNormalized,
    platform_params: PlatformParams,
    keywords: Option<Vec<Keyword>>,
) -> ParsedTemplate {
    let variables = collect_variables(&template.variables, &template.base_prompt);
    ParsedTemplate {
        id: template.id,
        name: template.name,
        description: template.description,
        base_prompt: template.base_prompt,
        variables,
        example_values: template.example_values,
        category: template.category,
        platform_params,
        keywords,
    }
}

pub fn combine_template_data(
    templates: Vec<TemplateNormalized>,
    keywords: &[Keyword],
    platforms: &[Platform],
    template_keywords: &[TemplateKeyword],
    template_platform_params: &[TemplatePlatformParameters],
) -> CombinedTemplates {
    let platforms_by_id = platforms
        .iter()
        .map(|platform| (platform.id, platform.name))
        .collect::<HashMap<_, _>>();
    let mut diagnostics = Vec::new();

    let parsed = templates
        .into_iter()
        .map(|template| {
            let keyword_ids = template_keywords
                .iter()
                .filter(|link| link.template_id == template.id)
                .map(|link| link.keyword_id)
                .collect::<Vec<_>>();
            for keyword_id in &keyword_ids {
                if !keywords.iter().any(|keyword| keyword.id == *keyword_id) {
                    diagnostics.push(DataDiagnostic::UnknownKeyword {
                        template_id: template.id.clone(),
                        keyword_id: *keyword_id,
                    });
                }
            }
            let resolved_keywords = keywords
                .iter()
                .filter(|keyword| keyword_ids.contains(&keyword.id))
                .cloned()
                .collect::<Vec<_>>();

            let mut platform_params = PlatformParams::default();
            for link in template_platform_params
                .iter()
                .filter(|link| link.template_id == template.id)
            {
                let Some(platform) = platforms_by_id.get(&link.platform_id).copied() else {
                    diagnostics.push(DataDiagnostic::UnresolvedPlatform {
                        template_id: template.id.clone(),
                        platform_id: link.platform_id,
                    });
                    continue;
                };
                if let Some(parameter) = parse_platform_parameter(platform, &link.parameters) {
                    let issues = validate_platform_params(&parameter, platform);
                    if !issues.is_empty() {
                        diagnostics.push(DataDiagnostic::InvalidPlatformParams {
                            template_id: template.id.clone(),
                            platform,
                            issues,
                        });
                    }
                    platform_params.set(platform, parameter);
                }
            }

            let parsed = build_parsed_template(template, platform_params, Some(resolved_keywords));
            for name in parsed.variables.iter().filter(|name| !is_valid_variable_name(name)) {
                diagnostics.push(DataDiagnostic::InvalidVariableName {
                    template_id: parsed.id.clone(),
                    name: name.clone(),
                });
            }
            parsed
        })
        .collect();

    CombinedTemplates {
        templates: parsed,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::types::Category;

    fn template(id: &str, base_prompt: &str, variables: &str) -> TemplateNormalized {
        TemplateNormalized {
            id: id.to_string(),
            name: format!("Template {id}"),
            description: "desc".to_string(),
            base_prompt: base_prompt.to_string(),
            variables: variables.to_string(),
            example_values: String::new(),
            category: Category::Character,
        }
    }

    fn keyword(id: i64, word: &str) -> Keyword {
        Keyword {
            id,
            keyword: word.to_string(),
            category: "style".to_string(),
            description: String::new(),
        }
    }

    fn platforms() -> Vec<Platform> {
        vec![
            Platform { id: 1, name: PlatformName::Midjourney, description: String::new() },
            Platform { id: 2, name: PlatformName::StableDiffusion, description: String::new() },
            Platform { id: 3, name: PlatformName::Flux, description: String::new() },
        ]
    }

    fn param_link(id: i64, template_id: &str, platform_id: i64, parameters: &str) -> TemplatePlatformParameters {
        TemplatePlatformParameters {
            id,
            template_id: template_id.to_string(),
            platform_id,
            parameters: parameters.to_string(),
        }
    }

    #[test]
    fn variables_union_explicit_list_and_placeholders() {
        assert_eq!(
            collect_variables("animal, style,, animal", "a [animal] in [style] under [light]"),
            vec!["animal", "style", "light"]
        );
        assert_eq!(collect_variables("", "[x] and [x]"), vec!["x"]);
    }

    #[test]
    fn midjourney_parameters_are_never_parsed_as_json() {
        assert_eq!(
            parse_platform_parameter(PlatformName::Midjourney, r#"{"ar":"1:1"}"#),
            Some(PlatformParameter::Text(r#"{"ar":"1:1"}"#.to_string()))
        );
    }

    #[test]
    fn structured_parameters_keep_document_order() {
        let Some(PlatformParameter::Structured(map)) = parse_platform_parameter(
            PlatformName::StableDiffusion,
            r#"{"steps":25,"cfg_scale":7.5,"sampler":"Euler a","hires":true,"seed":null}"#,
        ) else {
            panic!("expected structured parameters");
        };
        assert_eq!(
            map.keys().collect::<Vec<_>>(),
            vec!["steps", "cfg_scale", "sampler", "hires"]
        );
        assert_eq!(map["cfg_scale"].to_string(), "7.5");
        assert_eq!(map["hires"], ParamValue::Text("true".to_string()));
    }

    #[test]
    fn unparseable_json_falls_back_to_text() {
        assert_eq!(
            parse_platform_parameter(PlatformName::Flux, "{steps: 20"),
            Some(PlatformParameter::Text("{steps: 20".to_string()))
        );
        assert_eq!(
            parse_platform_parameter(PlatformName::Flux, "--steps 20"),
            Some(PlatformParameter::Text("--steps 20".to_string()))
        );
    }

    #[test]
    fn doubled_quotes_from_exports_are_normalized() {
        let parsed = parse_platform_parameter(PlatformName::Flux, r#"{""steps"": 20}"#);
        let Some(PlatformParameter::Structured(map)) = parsed else {
            panic!("expected structured parameters");
        };
        assert_eq!(map["steps"].to_string(), "20");
    }

    #[test]
    fn blank_parameters_produce_no_entry() {
        assert_eq!(parse_platform_parameter(PlatformName::Flux, "   "), None);
        assert_eq!(parse_platform_parameter(PlatformName::Midjourney, ""), None);
    }

    #[test]
    fn combines_keywords_and_platform_parameters() {
        let keywords = vec![keyword(1, "neon"), keyword(2, "bokeh"), keyword(3, "ink")];
        let links = vec![
            TemplateKeyword { id: 1, template_id: "t1".to_string(), keyword_id: 1 },
            TemplateKeyword { id: 2, template_id: "t1".to_string(), keyword_id: 3 },
            TemplateKeyword { id: 3, template_id: "t2".to_string(), keyword_id: 2 },
        ];
        let params = vec![param_link(1, "t1", 1, "--ar 3:2")];

        let combined = combine_template_data(
            vec![template("t1", "a [animal]", "animal"), template("t2", "plain", "")],
            &keywords,
            &platforms(),
            &links,
            &params,
        );

        let first = &combined.templates[0];
        assert_eq!(first.keywords.as_ref().map(Vec::len), Some(2));
        assert_eq!(first.platform_params.populated(), 1);
        assert_eq!(
            first.platform_params.midjourney,
            Some(PlatformParameter::Text("--ar 3:2".to_string()))
        );

        let second = &combined.templates[1];
        assert_eq!(second.keywords.as_ref().map(Vec::len), Some(1));
        assert_eq!(second.platform_params.populated(), 0);
        assert!(combined.diagnostics.is_empty());
    }

    #[test]
    fn unresolved_links_are_skipped_and_reported() {
        let links = vec![TemplateKeyword { id: 1, template_id: "t1".to_string(), keyword_id: 42 }];
        let params = vec![
            param_link(1, "t1", 9, "--ar 1:1"),
            param_link(2, "t1", 3, r#"{"steps":20}"#),
        ];

        let combined = combine_template_data(
            vec![template("t1", "x", "")],
            &[],
            &platforms(),
            &links,
            &params,
        );

        let parsed = &combined.templates[0];
        assert_eq!(parsed.keywords, Some(Vec::new()));
        assert_eq!(parsed.platform_params.populated(), 1);
        assert!(parsed.platform_params.flux.is_some());
        assert_eq!(
            combined.diagnostics,
            vec![
                DataDiagnostic::UnknownKeyword { template_id: "t1".to_string(), keyword_id: 42 },
                DataDiagnostic::UnresolvedPlatform { template_id: "t1".to_string(), platform_id: 9 },
            ]
        );
    }

    #[test]
    fn reports_unusable_parameters_and_odd_variable_names() {
        let params = vec![param_link(1, "t1", 2, "{steps: 20")];

        let combined = combine_template_data(
            vec![template("t1", "a [main subject]", "")],
            &[],
            &platforms(),
            &[],
            &params,
        );

        assert_eq!(
            combined.templates[0].platform_params.stable_diffusion,
            Some(PlatformParameter::Text("{steps: 20".to_string()))
        );
        assert!(matches!(
            &combined.diagnostics[0],
            DataDiagnostic::InvalidPlatformParams { platform: PlatformName::StableDiffusion, issues, .. }
                if issues[0].code == "invalid_json"
        ));
        assert_eq!(
            combined.diagnostics[1],
            DataDiagnostic::InvalidVariableName {
                template_id: "t1".to_string(),
                name: "main subject".to_string(),
            }
        );
    }
}
