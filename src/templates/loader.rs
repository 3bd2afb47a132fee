use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::notion::client::NotionClient;
use crate::templates::combine::combine_template_data;
use crate::templates::csv::parse_csv;
use crate::templates::types::{
    builtin_platforms, Category, CsvRecord, DataDiagnostic, Keyword, ParsedTemplate, Platform,
    TemplateKeyword, TemplatePlatformParameters, TemplateRecord,
};
use crate::templates::validation::validate_template;

pub const TEMPLATES_FILE: &str = "templates_normalized.csv";
pub const KEYWORDS_FILE: &str = "keywords.csv";
pub const PLATFORMS_FILE: &str = "platforms.csv";
pub const TEMPLATE_KEYWORDS_FILE: &str = "template_keywords.csv";
pub const TEMPLATE_PLATFORM_PARAMS_FILE: &str = "template_platform_parameters.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Notion,
    Csv,
    Fallback,
}

impl DataSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DataSource::Notion => "notion",
            DataSource::Csv => "csv",
            DataSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TemplateData {
    pub templates: Vec<ParsedTemplate>,
    pub keywords: Vec<Keyword>,
    pub platforms: Vec<Platform>,
    pub source: DataSource,
    pub diagnostics: Vec<DataDiagnostic>,
}

impl TemplateData {
    fn empty() -> Self {
        TemplateData {
            templates: Vec::new(),
            keywords: Vec::new(),
            platforms: builtin_platforms(),
            source: DataSource::Fallback,
            diagnostics: Vec::new(),
        }
    }
}

/// The five normalized tables, decoded but not yet validated or joined.
#[derive(Debug, Clone, Default)]
pub struct CsvTables {
    pub templates: Vec<TemplateRecord>,
    pub keywords: Vec<Keyword>,
    pub platforms: Vec<Platform>,
    pub template_keywords: Vec<TemplateKeyword>,
    pub template_platform_params: Vec<TemplatePlatformParameters>,
    pub diagnostics: Vec<DataDiagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplatePlatformLink {
    pub id: i64,
    pub template_id: String,
    pub platform_id: i64,
    pub parameters: String,
    pub platform_name: String,
}

async fn read_optional(path: PathBuf) -> Result<Option<String>> {
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(anyhow!("Failed to read '{}': {}", path.display(), err)),
    }
}

fn decode_table<T: CsvRecord>(
    file_name: &str,
    content: Option<String>,
    diagnostics: &mut Vec<DataDiagnostic>,
) -> Vec<T> {
    let Some(content) = content else {
        warn!("{} not found; treating it as empty", file_name);
        return Vec::new();
    };

    let table = parse_csv(&content);
    diagnostics.extend(table.skipped.iter().map(|skipped| DataDiagnostic::MalformedRow {
        source: file_name.to_string(),
        line: skipped.line_number,
        expected: skipped.expected,
        found: skipped.found,
    }));

    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        match T::from_row(row) {
            Ok(record) => records.push(record),
            Err(reason) => diagnostics.push(DataDiagnostic::InvalidRow {
                source: file_name.to_string(),
                line: row.line_number,
                reason,
            }),
        }
    }
    records
}

/// Reads the five CSV files concurrently. `Ok(None)` when the templates file
/// itself is missing; the other tables are optional.
pub async fn load_csv_tables(dir: &Path) -> Result<Option<CsvTables>> {
    let (templates, keywords, platforms, template_keywords, template_platform_params) = tokio::try_join!(
        read_optional(dir.join(TEMPLATES_FILE)),
        read_optional(dir.join(KEYWORDS_FILE)),
        read_optional(dir.join(PLATFORMS_FILE)),
        read_optional(dir.join(TEMPLATE_KEYWORDS_FILE)),
        read_optional(dir.join(TEMPLATE_PLATFORM_PARAMS_FILE)),
    )?;

    let Some(templates) = templates else {
        return Ok(None);
    };

    let mut diagnostics = Vec::new();
    let platforms_missing = platforms.is_none();
    let mut tables = CsvTables {
        templates: decode_table(TEMPLATES_FILE, Some(templates), &mut diagnostics),
        keywords: decode_table(KEYWORDS_FILE, keywords, &mut diagnostics),
        platforms: decode_table(PLATFORMS_FILE, platforms, &mut diagnostics),
        template_keywords: decode_table(TEMPLATE_KEYWORDS_FILE, template_keywords, &mut diagnostics),
        template_platform_params: decode_table(
            TEMPLATE_PLATFORM_PARAMS_FILE,
            template_platform_params,
            &mut diagnostics,
        ),
        diagnostics: Vec::new(),
    };
    if platforms_missing {
        tables.platforms = builtin_platforms();
    }
    tables.diagnostics = diagnostics;
    Ok(Some(tables))
}

pub fn build_template_data(tables: CsvTables) -> TemplateData {
    let mut diagnostics = tables.diagnostics;

    let mut templates = Vec::with_capacity(tables.templates.len());
    for record in &tables.templates {
        match validate_template(record) {
            Ok(template) => templates.push(template),
            Err(issues) => diagnostics.push(DataDiagnostic::InvalidTemplate {
                template_id: record.id.clone(),
                issues,
            }),
        }
    }

    let combined = combine_template_data(
        templates,
        &tables.keywords,
        &tables.platforms,
        &tables.template_keywords,
        &tables.template_platform_params,
    );
    diagnostics.extend(combined.diagnostics);

    TemplateData {
        templates: combined.templates,
        keywords: tables.keywords,
        platforms: tables.platforms,
        source: DataSource::Csv,
        diagnostics,
    }
}

pub fn log_diagnostics(data: &TemplateData) {
    for diagnostic in &data.diagnostics {
        warn!("Template data: {}", diagnostic);
    }
    info!(
        "Loaded {} template(s) from {} with {} diagnostic(s)",
        data.templates.len(),
        data.source.as_str(),
        data.diagnostics.len()
    );
}

#[derive(Debug, Clone)]
pub struct TemplateLoader {
    notion: Option<NotionClient>,
    data_dir: PathBuf,
}

impl TemplateLoader {
    pub fn new(notion: Option<NotionClient>, data_dir: PathBuf) -> Self {
        TemplateLoader { notion, data_dir }
    }

    pub fn from_config(config: &Config) -> Self {
        TemplateLoader::new(
            NotionClient::from_config(config),
            config.template_data_dir.clone(),
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Notion first when configured, then the CSV directory, then empty data.
    pub async fn load(&self) -> TemplateData {
        if let Some(notion) = &self.notion {
            match notion.fetch_templates().await {
                Ok(result) => {
                    let data = TemplateData {
                        templates: result.templates,
                        keywords: Vec::new(),
                        platforms: builtin_platforms(),
                        source: DataSource::Notion,
                        diagnostics: result.diagnostics,
                    };
                    log_diagnostics(&data);
                    return data;
                }
                Err(err) => warn!("Failed to fetch data from Notion: {}", err),
            }
        }

        match load_csv_tables(&self.data_dir).await {
            Ok(Some(tables)) => {
                let data = build_template_data(tables);
                log_diagnostics(&data);
                data
            }
            Ok(None) => {
                debug!(
                    "No {} in '{}'; returning empty template data",
                    TEMPLATES_FILE,
                    self.data_dir.display()
                );
                TemplateData::empty()
            }
            Err(err) => {
                warn!("Failed to load CSV template data: {}", err);
                TemplateData::empty()
            }
        }
    }

    /// Link rows come from the CSV directory only; no directory means no links.
    pub async fn platform_links(&self, template_id: &str) -> Result<Vec<TemplatePlatformLink>> {
        let Some(tables) = load_csv_tables(&self.data_dir).await? else {
            debug!(
                "No {} in '{}'; no platform links for template {}",
                TEMPLATES_FILE,
                self.data_dir.display(),
                template_id
            );
            return Ok(Vec::new());
        };
        Ok(platform_links_for(&tables, template_id))
    }
}

pub fn platform_links_for(tables: &CsvTables, template_id: &str) -> Vec<TemplatePlatformLink> {
    tables
        .template_platform_params
        .iter()
        .filter(|link| link.template_id == template_id)
        .map(|link| {
            let platform_name = tables
                .platforms
                .iter()
                .find(|platform| platform.id == link.platform_id)
                .map(|platform| platform.name.to_string())
                .unwrap_or_else(|| format!("platform_{}", link.platform_id));
            TemplatePlatformLink {
                id: link.id,
                template_id: link.template_id.clone(),
                platform_id: link.platform_id,
                parameters: link.parameters.clone(),
                platform_name,
            }
        })
        .collect()
}

pub fn find_template<'a>(templates: &'a [ParsedTemplate], id: &str) -> Option<&'a ParsedTemplate> {
    templates.iter().find(|template| template.id == id)
}

/// Case-insensitive search over name, description and base prompt.
pub fn filter_templates(
    templates: Vec<ParsedTemplate>,
    category: Option<Category>,
    search: Option<&str>,
) -> Vec<ParsedTemplate> {
    let needle = search
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty());

    templates
        .into_iter()
        .filter(|template| category.map_or(true, |category| template.category == category))
        .filter(|template| match &needle {
            None => true,
            Some(needle) => [&template.name, &template.description, &template.base_prompt]
                .iter()
                .any(|field| field.to_lowercase().contains(needle.as_str())),
        })
        .collect()
}

pub fn categories(templates: &[ParsedTemplate]) -> Vec<Category> {
    let mut seen = Vec::new();
    for template in templates {
        if !seen.contains(&template.category) {
            seen.push(template.category);
        }
    }
    seen
}
