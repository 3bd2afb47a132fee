use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

mod config;
mod http;
mod llm;
mod notion;
mod prompt;
mod state;
mod templates;
mod utils;

use config::Config;
use notion::client::NotionClient;
use state::AppState;
use templates::export::export_notion_csv;
use templates::loader::{categories, TemplateLoader};
use templates::types::DataDiagnostic;
use utils::logging::init_logging;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Serve,
    CheckData { dir: Option<PathBuf> },
    ExportNotionCsv { dir: Option<PathBuf>, out: Option<PathBuf> },
}

fn usage() -> &'static str {
    "Usage: prompt_enhancer [serve | check-data [--dir <path>] | export-notion-csv [--dir <path>] [--out <file>]]"
}

fn take_path(args: &[String], index: &mut usize, flag: &str) -> anyhow::Result<PathBuf> {
    *index += 1;
    args.get(*index)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

fn parse_cli_args(args: &[String]) -> anyhow::Result<CliCommand> {
    let Some(command) = args.get(1).map(|value| value.as_str()) else {
        return Ok(CliCommand::Serve);
    };

    let mut dir = None;
    let mut out = None;
    let mut index = 2;
    while index < args.len() {
        match (command, args[index].as_str()) {
            (_, "--help" | "-h") => return Err(anyhow!(usage())),
            ("check-data" | "export-notion-csv", "--dir") => {
                dir = Some(take_path(args, &mut index, "--dir")?);
            }
            ("export-notion-csv", "--out") => {
                out = Some(take_path(args, &mut index, "--out")?);
            }
            (_, other) => {
                return Err(anyhow!(
                    "Unknown {command} argument: {other}\n{}",
                    usage()
                ));
            }
        }
        index += 1;
    }

    match command {
        "serve" => Ok(CliCommand::Serve),
        "check-data" => Ok(CliCommand::CheckData { dir }),
        "export-notion-csv" => Ok(CliCommand::ExportNotionCsv { dir, out }),
        "--help" | "-h" => Err(anyhow!(usage())),
        other => Err(anyhow!("Unknown command: {other}\n{}", usage())),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let address = config.bind_address();
    let state = AppState::from_config(config);
    let router = http::build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Prompt enhancer listening on http://{}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn check_data(config: &Config, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let loader = TemplateLoader::new(
        NotionClient::from_config(config),
        dir.unwrap_or_else(|| config.template_data_dir.clone()),
    );
    info!("Checking template data in '{}'", loader.data_dir().display());

    let data = loader.load().await;
    let mut skipped_rows = 0;
    let mut invalid_rows = 0;
    let mut invalid_templates = 0;
    let mut unresolved_links = 0;
    let mut questionable_fields = 0;
    for diagnostic in &data.diagnostics {
        match diagnostic {
            DataDiagnostic::MalformedRow { .. } => skipped_rows += 1,
            DataDiagnostic::InvalidRow { .. } => invalid_rows += 1,
            DataDiagnostic::InvalidTemplate { .. } => invalid_templates += 1,
            DataDiagnostic::UnresolvedPlatform { .. } | DataDiagnostic::UnknownKeyword { .. } => {
                unresolved_links += 1
            }
            DataDiagnostic::InvalidPlatformParams { .. }
            | DataDiagnostic::InvalidVariableName { .. } => questionable_fields += 1,
        }
    }
    let with_platform_params = data
        .templates
        .iter()
        .filter(|template| template.platform_params.populated() > 0)
        .count();

    let category_names = categories(&data.templates)
        .iter()
        .map(|category| category.as_str())
        .collect::<Vec<_>>();
    info!(
        "Data summary: source={} templates={} with_platform_params={} keywords={} platforms={} categories=[{}] skipped_rows={} invalid_rows={} invalid_templates={} unresolved_links={} questionable_fields={}",
        data.source.as_str(),
        data.templates.len(),
        with_platform_params,
        data.keywords.len(),
        data.platforms.len(),
        category_names.join(", "),
        skipped_rows,
        invalid_rows,
        invalid_templates,
        unresolved_links,
        questionable_fields
    );
    if data.templates.is_empty() {
        warn!("No templates were loaded");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(Config::load()?);
    let _guards = init_logging(&config);
    config.log_warnings();

    let args: Vec<String> = std::env::args().collect();
    match parse_cli_args(&args)? {
        CliCommand::Serve => serve(config).await,
        CliCommand::CheckData { dir } => check_data(&config, dir).await,
        CliCommand::ExportNotionCsv { dir, out } => {
            let dir = dir.unwrap_or_else(|| config.template_data_dir.clone());
            let (path, rows) = export_notion_csv(&dir, out).await?;
            info!("Notion CSV export complete: {} row(s) in {}", rows, path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("prompt_enhancer")
            .chain(values.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_to_serve() {
        assert_eq!(parse_cli_args(&args(&[])).unwrap(), CliCommand::Serve);
        assert_eq!(parse_cli_args(&args(&["serve"])).unwrap(), CliCommand::Serve);
    }

    #[test]
    fn parses_data_commands() {
        assert_eq!(
            parse_cli_args(&args(&["check-data", "--dir", "fixtures"])).unwrap(),
            CliCommand::CheckData {
                dir: Some(PathBuf::from("fixtures"))
            }
        );
        assert_eq!(
            parse_cli_args(&args(&["export-notion-csv", "--out", "out.csv"])).unwrap(),
            CliCommand::ExportNotionCsv {
                dir: None,
                out: Some(PathBuf::from("out.csv"))
            }
        );
    }

    #[test]
    fn rejects_unknown_commands_and_flags() {
        assert!(parse_cli_args(&args(&["migrate"])).is_err());
        assert!(parse_cli_args(&args(&["check-data", "--out", "x"])).is_err());
        assert!(parse_cli_args(&args(&["check-data", "--dir"])).is_err());
        assert!(parse_cli_args(&args(&["serve", "--port"])).is_err());
    }
}
