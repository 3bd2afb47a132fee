use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::templates::csv::write_csv_line;
use crate::templates::loader::{load_csv_tables, CsvTables, TEMPLATES_FILE};
use crate::templates::types::PlatformName;
use crate::templates::validation::validate_template;

pub const DEFAULT_EXPORT_PATH: &str = "data/notion/templates_generated.csv";

pub const NOTION_EXPORT_HEADERS: [&str; 10] = [
    "id",
    "name",
    "description",
    "base_prompt",
    "variables",
    "example_values",
    "category",
    "mj_params",
    "sd_params",
    "flux_params",
];

fn raw_parameters(tables: &CsvTables, template_id: &str, platform: PlatformName) -> String {
    tables
        .template_platform_params
        .iter()
        .filter(|link| link.template_id == template_id)
        .find(|link| {
            tables
                .platforms
                .iter()
                .any(|p| p.id == link.platform_id && p.name == platform)
        })
        .map(|link| link.parameters.trim().to_string())
        .unwrap_or_default()
}

/// One row per valid template, platform parameters folded into columns in
/// their stored text form. Returns the CSV text and the number of rows.
pub fn render_notion_csv(tables: &CsvTables) -> (String, usize) {
    let mut lines = vec![write_csv_line(&NOTION_EXPORT_HEADERS)];

    for record in &tables.templates {
        let template = match validate_template(record) {
            Ok(template) => template,
            Err(issues) => {
                warn!(
                    "Skipping template '{}' in export: {} validation issue(s)",
                    record.id,
                    issues.len()
                );
                continue;
            }
        };

        let params = PlatformName::ALL.map(|platform| raw_parameters(tables, &template.id, platform));
        let [mj_params, sd_params, flux_params] = params;
        lines.push(write_csv_line(&[
            template.id.as_str(),
            template.name.as_str(),
            template.description.as_str(),
            template.base_prompt.as_str(),
            template.variables.as_str(),
            template.example_values.as_str(),
            template.category.as_str(),
            mj_params.as_str(),
            sd_params.as_str(),
            flux_params.as_str(),
        ]));
    }

    let rows = lines.len() - 1;
    (lines.join("\n") + "\n", rows)
}

pub async fn export_notion_csv(data_dir: &Path, out: Option<PathBuf>) -> Result<(PathBuf, usize)> {
    let tables = load_csv_tables(data_dir).await?.ok_or_else(|| {
        anyhow!(
            "{} not found in '{}'",
            TEMPLATES_FILE,
            data_dir.display()
        )
    })?;

    let out = out.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_PATH));
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create '{}'", parent.display()))?;
    }

    let (content, rows) = render_notion_csv(&tables);
    tokio::fs::write(&out, content)
        .await
        .with_context(|| format!("Failed to write '{}'", out.display()))?;

    info!("Wrote {} template(s) to {}", rows, out.display());
    Ok((out, rows))
}
