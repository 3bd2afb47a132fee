use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::http::error::{AppError, AppResult};
use crate::prompt::enhance::{prompt_values_to_text, EnhanceRequest, MISSING_FIELDS_MESSAGE};
use crate::state::AppState;
use crate::templates::loader::{filter_templates, find_template};
use crate::templates::types::Category;
use crate::templates::validation::validate_prompt_values;
use crate::utils::timing::start_request_timer;

#[derive(Debug, Default, Deserialize)]
pub struct TemplateQuery {
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptValuesBody {
    #[serde(rename = "promptValues", default)]
    pub prompt_values: HashMap<String, Value>,
}

fn parse_category_filter(value: Option<&str>) -> AppResult<Option<Category>> {
    match value.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => value
            .parse::<Category>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Unknown category '{value}'"))),
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/templates", get(list_templates))
        .route("/api/templates/{id}", get(get_template))
        .route("/api/templates/{id}/platforms", get(template_platforms))
        .route("/api/templates/{id}/validate", post(validate_values))
        .route("/api/platforms", get(list_platforms))
        .route("/api/enhance", post(enhance))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<TemplateQuery>,
) -> AppResult<Json<Value>> {
    let category = parse_category_filter(query.category.as_deref())?;
    let data = state.loader.load().await;
    let templates = filter_templates(data.templates, category, query.search.as_deref());
    Ok(Json(json!({ "templates": templates })))
}

async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let data = state.loader.load().await;
    let template = find_template(&data.templates, &id)
        .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))?;
    Ok(Json(json!({ "template": template })))
}

async fn template_platforms(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let links = state.loader.platform_links(&id).await?;
    Ok(Json(json!(links)))
}

async fn validate_values(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PromptValuesBody>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(body) = payload.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let data = state.loader.load().await;
    let template = find_template(&data.templates, &id)
        .ok_or_else(|| AppError::NotFound(format!("Template {id} not found")))?;

    let values = prompt_values_to_text(body.prompt_values);
    let issues = validate_prompt_values(&values, template);
    Ok(Json(json!({ "valid": issues.is_empty(), "issues": issues })))
}

async fn list_platforms(State(state): State<AppState>) -> Json<Value> {
    let data = state.loader.load().await;
    Json(json!({ "platforms": data.platforms }))
}

async fn enhance(
    State(state): State<AppState>,
    payload: Result<Json<EnhanceRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected enhance request body: {}", rejection.body_text());
        AppError::BadRequest(MISSING_FIELDS_MESSAGE.to_string())
    })?;

    let mut timer = start_request_timer("enhance", request.base_prompt.clone());
    debug!("Enhance request routed to model {}", state.config.openrouter_model);
    match state.enhancer.enhance(request).await {
        Ok(response) => Ok(Json(json!(response))),
        Err(err) => {
            timer.mark_status("error");
            Err(err.into())
        }
    }
}
