use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::llm::openrouter::LlmError;
use crate::prompt::enhance::EnhanceError;

/// Every failure renders as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Enhance(#[from] EnhanceError),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Enhance(EnhanceError::InvalidRequest(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Enhance(EnhanceError::Llm(LlmError::MissingApiKey)) => {
                tracing::error!("Enhancement requested without OPENROUTER_API_KEY");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    LlmError::MissingApiKey.to_string(),
                )
            }
            AppError::Enhance(EnhanceError::Llm(err)) => {
                tracing::error!(error = %err, "Enhancement failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to enhance prompt".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn maps_errors_to_status_and_error_body() {
        let (status, body) = render(AppError::NotFound("Template not found".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Template not found" }));

        let (status, body) = render(EnhanceError::InvalidRequest("missing".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing");

        let (status, body) = render(EnhanceError::Llm(LlmError::MissingApiKey).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "OPENROUTER_API_KEY is not configured");
    }

    #[tokio::test]
    async fn upstream_details_are_not_leaked() {
        let err = EnhanceError::Llm(LlmError::Upstream {
            status: 401,
            body: "invalid key sk-or-v1-secret".into(),
        });
        let (status, body) = render(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to enhance prompt");
    }
}
