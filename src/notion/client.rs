use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::templates::combine::{build_parsed_template, parse_platform_parameter};
use crate::templates::types::{
    DataDiagnostic, ParsedTemplate, PlatformName, PlatformParams, TemplateRecord,
};
use crate::templates::validation::validate_template;
use crate::utils::http::get_http_client;

const PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("Notion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Notion API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("Unexpected Notion response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Default)]
pub struct NotionTemplates {
    pub templates: Vec<ParsedTemplate>,
    pub diagnostics: Vec<DataDiagnostic>,
}

#[derive(Debug, Clone)]
pub struct NotionClient {
    http: Client,
    base_url: String,
    api_key: String,
    database_id: String,
    version: String,
}

impl NotionClient {
    pub fn new(
        http: Client,
        base_url: &str,
        api_key: &str,
        database_id: &str,
        version: &str,
    ) -> Self {
        NotionClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            database_id: database_id.to_string(),
            version: version.to_string(),
        }
    }

    /// `None` unless both the integration token and database id are configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.notion_enabled() {
            return None;
        }
        Some(NotionClient::new(
            get_http_client().clone(),
            &config.notion_base_url,
            &config.notion_api_key,
            &config.notion_database_id,
            &config.notion_version,
        ))
    }

    fn with_headers(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, NotionError> {
        let response = self.with_headers(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
            let code = parsed
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = parsed
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(body);
            return Err(NotionError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        Ok(response.json::<Value>().await?)
    }

    async fn retrieve_database(&self) -> Result<Value, NotionError> {
        let endpoint = format!("{}/databases/{}", self.base_url, self.database_id);
        self.send(self.http.get(endpoint)).await
    }

    async fn query_all(&self, endpoint: &str) -> Result<Vec<Value>, NotionError> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = Value::String(cursor.clone());
            }

            let response = self.send(self.http.post(endpoint).json(&body)).await?;
            let results = response
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| NotionError::MalformedResponse("missing 'results' array".into()))?;
            pages.extend(results.iter().cloned());

            let has_more = response
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            cursor = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || cursor.is_none() {
                break;
            }
        }

        Ok(pages)
    }

    /// Queries through the database's first data source, or the legacy
    /// database query when the database lists no data sources.
    pub async fn query_pages(&self) -> Result<Vec<Value>, NotionError> {
        let database = self.retrieve_database().await?;
        let data_source_id = database
            .get("data_sources")
            .and_then(Value::as_array)
            .and_then(|sources| sources.first())
            .and_then(|source| source.get("id"))
            .and_then(Value::as_str);

        let endpoint = match data_source_id {
            Some(id) => {
                debug!("Querying Notion data source {}", id);
                format!("{}/data_sources/{}/query", self.base_url, id)
            }
            None => {
                debug!("No Notion data sources listed; using legacy database query");
                format!("{}/databases/{}/query", self.base_url, self.database_id)
            }
        };
        self.query_all(&endpoint).await
    }

    pub async fn fetch_templates(&self) -> Result<NotionTemplates, NotionError> {
        let pages = self.query_pages().await?;
        let mut result = NotionTemplates::default();

        for page in &pages {
            let (record, platform_params) = page_to_template(page);
            match validate_template(&record) {
                Ok(template) => result
                    .templates
                    .push(build_parsed_template(template, platform_params, None)),
                Err(issues) => {
                    warn!("Skipping invalid Notion template '{}'", record.id);
                    result.diagnostics.push(DataDiagnostic::InvalidTemplate {
                        template_id: record.id,
                        issues,
                    });
                }
            }
        }

        info!(
            "Loaded {} template(s) from Notion ({} page(s), {} skipped)",
            result.templates.len(),
            pages.len(),
            result.diagnostics.len()
        );
        Ok(result)
    }
}

fn join_plain_text(items: Option<&Value>) -> String {
    items
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Reads a page property as text regardless of its Notion property type.
pub fn property_text(properties: &Value, name: &str) -> String {
    let Some(property) = properties.get(name) else {
        return String::new();
    };
    match property.get("type").and_then(Value::as_str) {
        Some("title") => join_plain_text(property.get("title")),
        Some("rich_text") => join_plain_text(property.get("rich_text")),
        Some("select") => property
            .pointer("/select/name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        Some("number") => property
            .get("number")
            .filter(|value| !value.is_null())
            .map(Value::to_string)
            .unwrap_or_default(),
        Some("unique_id") => property
            .pointer("/unique_id/number")
            .filter(|value| !value.is_null())
            .map(Value::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

pub fn page_to_template(page: &Value) -> (TemplateRecord, PlatformParams) {
    let properties = page.get("properties").cloned().unwrap_or(Value::Null);

    let mut id = property_text(&properties, "id");
    if id.trim().is_empty() {
        id = page
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
    }

    let record = TemplateRecord {
        id,
        name: property_text(&properties, "name"),
        description: property_text(&properties, "description"),
        base_prompt: property_text(&properties, "base_prompt"),
        variables: property_text(&properties, "variables"),
        example_values: property_text(&properties, "example_values"),
        category: property_text(&properties, "category"),
    };

    let mut platform_params = PlatformParams::default();
    for (platform, property) in [
        (PlatformName::Midjourney, "mj_params"),
        (PlatformName::StableDiffusion, "sd_params"),
        (PlatformName::Flux, "flux_params"),
    ] {
        if let Some(parameter) =
            parse_platform_parameter(platform, &property_text(&properties, property))
        {
            platform_params.set(platform, parameter);
        }
    }

    (record, platform_params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::types::PlatformParameter;
    use mockito::Matcher;

    fn rich_text(text: &str) -> Value {
        json!({ "type": "rich_text", "rich_text": [{ "plain_text": text }] })
    }

    fn page(id: &str, name: &str, category: &str) -> Value {
        json!({
            "id": format!("page-{id}"),
            "properties": {
                "id": { "type": "number", "number": id.parse::<i64>().unwrap() },
                "name": { "type": "title", "title": [{ "plain_text": name }] },
                "description": rich_text("A description"),
                "base_prompt": rich_text("a [animal] in [style]"),
                "variables": rich_text("animal, style"),
                "example_values": rich_text("animal: fox"),
                "category": { "type": "select", "select": { "name": category } },
                "mj_params": rich_text("--ar 3:2"),
                "sd_params": rich_text(r#"{"steps": 25, "sampler": "Euler a"}"#),
                "flux_params": rich_text("")
            }
        })
    }

    fn client(server: &mockito::Server) -> NotionClient {
        NotionClient::new(Client::new(), &server.url(), "ntn_test", "db1", "2025-09-03")
    }

    #[test]
    fn reads_properties_of_each_type() {
        let properties = json!({
            "title": { "type": "title", "title": [{ "plain_text": "Epic " }, { "plain_text": "Landscape" }] },
            "choice": { "type": "select", "select": { "name": "Landscape" } },
            "empty_choice": { "type": "select", "select": null },
            "count": { "type": "number", "number": 7 },
            "missing_number": { "type": "number", "number": null }
        });
        assert_eq!(property_text(&properties, "title"), "Epic Landscape");
        assert_eq!(property_text(&properties, "choice"), "Landscape");
        assert_eq!(property_text(&properties, "empty_choice"), "");
        assert_eq!(property_text(&properties, "count"), "7");
        assert_eq!(property_text(&properties, "missing_number"), "");
        assert_eq!(property_text(&properties, "absent"), "");
    }

    #[test]
    fn maps_page_to_template_and_platform_params() {
        let (record, params) = page_to_template(&page("4", "Fantasy Animal", "Character"));
        assert_eq!(record.id, "4");
        assert_eq!(record.name, "Fantasy Animal");
        assert_eq!(record.category, "Character");
        assert_eq!(
            params.midjourney,
            Some(PlatformParameter::Text("--ar 3:2".to_string()))
        );
        assert!(matches!(
            params.stable_diffusion,
            Some(PlatformParameter::Structured(_))
        ));
        assert_eq!(params.flux, None);
    }

    #[test]
    fn falls_back_to_page_id_without_id_property() {
        let mut value = page("4", "Fox", "Character");
        value["properties"]
            .as_object_mut()
            .unwrap()
            .remove("id");
        let (record, _) = page_to_template(&value);
        assert_eq!(record.id, "page-4");
    }

    #[tokio::test]
    async fn queries_first_data_source_and_follows_pagination() {
        let mut server = mockito::Server::new_async().await;
        let _database = server
            .mock("GET", "/databases/db1")
            .match_header("authorization", "Bearer ntn_test")
            .match_header("notion-version", "2025-09-03")
            .with_status(200)
            .with_body(r#"{"object":"database","data_sources":[{"id":"ds1"}]}"#)
            .create_async()
            .await;
        let first = server
            .mock("POST", "/data_sources/ds1/query")
            .match_body(Matcher::Json(json!({ "page_size": 100 })))
            .with_status(200)
            .with_body(
                json!({ "results": [page("1", "Fox", "Character")], "has_more": true, "next_cursor": "c2" })
                    .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("POST", "/data_sources/ds1/query")
            .match_body(Matcher::Json(json!({ "page_size": 100, "start_cursor": "c2" })))
            .with_status(200)
            .with_body(
                json!({ "results": [page("2", "Owl", "Vehicle")], "has_more": false, "next_cursor": null })
                    .to_string(),
            )
            .create_async()
            .await;

        let result = client(&server).fetch_templates().await.unwrap();

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(result.templates.len(), 1);
        assert_eq!(result.templates[0].name, "Fox");
        assert_eq!(result.templates[0].variables, vec!["animal", "style"]);
        assert!(result.templates[0].keywords.is_none());
        assert!(matches!(
            &result.diagnostics[..],
            [DataDiagnostic::InvalidTemplate { template_id, .. }] if template_id == "2"
        ));
    }

    #[tokio::test]
    async fn uses_legacy_query_without_data_sources() {
        let mut server = mockito::Server::new_async().await;
        let _database = server
            .mock("GET", "/databases/db1")
            .with_status(200)
            .with_body(r#"{"object":"database"}"#)
            .create_async()
            .await;
        let legacy = server
            .mock("POST", "/databases/db1/query")
            .with_status(200)
            .with_body(json!({ "results": [], "has_more": false }).to_string())
            .create_async()
            .await;

        let pages = client(&server).query_pages().await.unwrap();

        legacy.assert_async().await;
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn surfaces_api_errors_with_status_and_code() {
        let mut server = mockito::Server::new_async().await;
        let _database = server
            .mock("GET", "/databases/db1")
            .with_status(404)
            .with_body(
                r#"{"object":"error","status":404,"code":"object_not_found","message":"Could not find database"}"#,
            )
            .create_async()
            .await;

        let err = client(&server).query_pages().await.unwrap_err();
        match err {
            NotionError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "object_not_found");
                assert_eq!(message, "Could not find database");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
