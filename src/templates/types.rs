use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::templates::csv::CsvRow;
use crate::templates::validation::ValidationIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformName {
    Midjourney,
    StableDiffusion,
    Flux,
}

impl PlatformName {
    pub const ALL: [PlatformName; 3] = [
        PlatformName::Midjourney,
        PlatformName::StableDiffusion,
        PlatformName::Flux,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformName::Midjourney => "midjourney",
            PlatformName::StableDiffusion => "stable_diffusion",
            PlatformName::Flux => "flux",
        }
    }
}

impl fmt::Display for PlatformName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "midjourney" => Ok(PlatformName::Midjourney),
            "stable_diffusion" => Ok(PlatformName::StableDiffusion),
            "flux" => Ok(PlatformName::Flux),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Character,
    Portrait,
    Landscape,
    Interior,
    Object,
    Style,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Character,
        Category::Portrait,
        Category::Landscape,
        Category::Interior,
        Category::Object,
        Category::Style,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Character => "Character",
            Category::Portrait => "Portrait",
            Category::Landscape => "Landscape",
            Category::Interior => "Interior",
            Category::Object => "Object",
            Category::Style => "Style",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| format!("unknown category '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub name: PlatformName,
    pub description: String,
}

/// Reference rows used when the data source has no platforms table.
pub fn builtin_platforms() -> Vec<Platform> {
    [
        (1, PlatformName::Midjourney, "Discord-based AI image generator"),
        (2, PlatformName::StableDiffusion, "Open source diffusion model"),
        (3, PlatformName::Flux, "High-quality image generation"),
    ]
    .into_iter()
    .map(|(id, name, description)| Platform {
        id,
        name,
        description: description.to_string(),
    })
    .collect()
}

/// Template fields as read from a data source, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_prompt: String,
    pub variables: String,
    pub example_values: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateNormalized {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_prompt: String,
    pub variables: String,
    pub example_values: String,
    pub category: Category,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub keyword: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateKeyword {
    pub id: i64,
    pub template_id: String,
    pub keyword_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePlatformParameters {
    pub id: i64,
    pub template_id: String,
    pub platform_id: i64,
    pub parameters: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(serde_json::Number),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(number) => write_number(f, number),
            ParamValue::Text(text) => f.write_str(text),
        }
    }
}

/// Whole floats print without a fraction, so `7.0` and `2e1` become `7` and `20`.
fn write_number(f: &mut fmt::Formatter<'_>, number: &serde_json::Number) -> fmt::Result {
    if number.is_f64() {
        if let Some(value) = number.as_f64() {
            if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                return write!(f, "{}", value as i64);
            }
            return write!(f, "{value}");
        }
    }
    write!(f, "{number}")
}

/// Midjourney stores a flag string; Stable Diffusion and Flux store a
/// key/value object, or the raw text when it is not valid JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlatformParameter {
    Text(String),
    Structured(IndexMap<String, ParamValue>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midjourney: Option<PlatformParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_diffusion: Option<PlatformParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flux: Option<PlatformParameter>,
}

impl PlatformParams {
    pub fn get(&self, platform: PlatformName) -> Option<&PlatformParameter> {
        match platform {
            PlatformName::Midjourney => self.midjourney.as_ref(),
            PlatformName::StableDiffusion => self.stable_diffusion.as_ref(),
            PlatformName::Flux => self.flux.as_ref(),
        }
    }

    pub fn set(&mut self, platform: PlatformName, value: PlatformParameter) {
        let slot = match platform {
            PlatformName::Midjourney => &mut self.midjourney,
            PlatformName::StableDiffusion => &mut self.stable_diffusion,
            PlatformName::Flux => &mut self.flux,
        };
        *slot = Some(value);
    }

    pub fn populated(&self) -> usize {
        PlatformName::ALL
            .into_iter()
            .filter(|platform| self.get(*platform).is_some())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_prompt: String,
    pub variables: Vec<String>,
    pub example_values: String,
    pub category: Category,
    #[serde(rename = "platformParams")]
    pub platform_params: PlatformParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<Keyword>>,
}

/// Problems found while loading that were tolerated rather than raised.
#[derive(Debug, Clone, PartialEq)]
pub enum DataDiagnostic {
    MalformedRow {
        source: String,
        line: usize,
        expected: usize,
        found: usize,
    },
    InvalidRow {
        source: String,
        line: usize,
        reason: String,
    },
    InvalidTemplate {
        template_id: String,
        issues: Vec<ValidationIssue>,
    },
    UnresolvedPlatform {
        template_id: String,
        platform_id: i64,
    },
    UnknownKeyword {
        template_id: String,
        keyword_id: i64,
    },
    InvalidPlatformParams {
        template_id: String,
        platform: PlatformName,
        issues: Vec<ValidationIssue>,
    },
    InvalidVariableName {
        template_id: String,
        name: String,
    },
}

impl fmt::Display for DataDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDiagnostic::MalformedRow {
                source,
                line,
                expected,
                found,
            } => write!(
                f,
                "{source}:{line}: expected {expected} fields, found {found}"
            ),
            DataDiagnostic::InvalidRow {
                source,
                line,
                reason,
            } => write!(f, "{source}:{line}: {reason}"),
            DataDiagnostic::InvalidTemplate { template_id, issues } => {
                let details = issues
                    .iter()
                    .map(|issue| format!("{}: {} ({})", issue.field, issue.message, issue.code))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "template '{template_id}' is invalid: {details}")
            }
            DataDiagnostic::UnresolvedPlatform {
                template_id,
                platform_id,
            } => write!(
                f,
                "template '{template_id}' references unknown platform {platform_id}"
            ),
            DataDiagnostic::UnknownKeyword {
                template_id,
                keyword_id,
            } => write!(
                f,
                "template '{template_id}' references unknown keyword {keyword_id}"
            ),
            DataDiagnostic::InvalidPlatformParams {
                template_id,
                platform,
                issues,
            } => {
                let details = issues
                    .iter()
                    .map(|issue| issue.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "template '{template_id}' has unusable {platform} parameters: {details}")
            }
            DataDiagnostic::InvalidVariableName { template_id, name } => write!(
                f,
                "template '{template_id}' uses variable '{name}' that is not a plain identifier"
            ),
        }
    }
}

/// Typed decoding of one CSV row; `Err` carries a human-readable reason.
pub trait CsvRecord: Sized {
    fn from_row(row: &CsvRow) -> Result<Self, String>;
}

fn parse_id(row: &CsvRow, column: &str) -> Result<i64, String> {
    let raw = row.get(column);
    raw.trim()
        .parse::<i64>()
        .map_err(|_| format!("column '{column}' is not an integer: '{raw}'"))
}

impl CsvRecord for TemplateRecord {
    fn from_row(row: &CsvRow) -> Result<Self, String> {
        Ok(TemplateRecord {
            id: row.get("id").to_string(),
            name: row.get("name").to_string(),
            description: row.get("description").to_string(),
            base_prompt: row.get("base_prompt").to_string(),
            variables: row.get("variables").to_string(),
            example_values: row.get("example_values").to_string(),
            category: row.get("category").to_string(),
        })
    }
}

impl CsvRecord for Keyword {
    fn from_row(row: &CsvRow) -> Result<Self, String> {
        Ok(Keyword {
            id: parse_id(row, "id")?,
            keyword: row.get("keyword").to_string(),
            category: row.get("category").to_string(),
            description: row.get("description").to_string(),
        })
    }
}

impl CsvRecord for Platform {
    fn from_row(row: &CsvRow) -> Result<Self, String> {
        Ok(Platform {
            id: parse_id(row, "id")?,
            name: row.get("name").parse()?,
            description: row.get("description").to_string(),
        })
    }
}

impl CsvRecord for TemplateKeyword {
    fn from_row(row: &CsvRow) -> Result<Self, String> {
        Ok(TemplateKeyword {
            id: parse_id(row, "id")?,
            template_id: row.get("template_id").to_string(),
            keyword_id: parse_id(row, "keyword_id")?,
        })
    }
}

impl CsvRecord for TemplatePlatformParameters {
    fn from_row(row: &CsvRow) -> Result<Self, String> {
        Ok(TemplatePlatformParameters {
            id: parse_id(row, "id")?,
            template_id: row.get("template_id").to_string(),
            platform_id: parse_id(row, "platform_id")?,
            parameters: row.get("parameters").to_string(),
        })
    }
}
