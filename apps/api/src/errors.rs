use std::fmt::Display;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::document::RasterError;
use crate::llm_client::LlmError;
use crate::ranking::batch::BatchError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    ConversionFailed(String),

    /// Transport or API failure talking to the LLM backend.
    #[error("{0}")]
    Network(String),

    /// The LLM answered but never matched the expected schema.
    #[error("{0}")]
    SchemaValidation(String),

    #[error("{0}")]
    MalformedInput(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Prefixes the message, keeping the error kind.
    pub fn context(self, prefix: impl Display) -> Self {
        match self {
            AppError::UnsupportedFormat(m) => AppError::UnsupportedFormat(format!("{prefix}: {m}")),
            AppError::ConversionFailed(m) => AppError::ConversionFailed(format!("{prefix}: {m}")),
            AppError::Network(m) => AppError::Network(format!("{prefix}: {m}")),
            AppError::SchemaValidation(m) => AppError::SchemaValidation(format!("{prefix}: {m}")),
            AppError::MalformedInput(m) => AppError::MalformedInput(format!("{prefix}: {m}")),
            AppError::Internal(e) => AppError::Internal(e.context(prefix.to_string())),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            AppError::ConversionFailed(_) => "CONVERSION_FAILED",
            AppError::Network(_) => "NETWORK_ERROR",
            AppError::SchemaValidation(_) => "SCHEMA_VALIDATION_FAILED",
            AppError::MalformedInput(_) => "MALFORMED_INPUT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<RasterError> for AppError {
    fn from(e: RasterError) -> Self {
        match e {
            RasterError::UnsupportedFormat(_) => AppError::UnsupportedFormat(e.to_string()),
            RasterError::Task(_) => AppError::Internal(anyhow::Error::new(e)),
            other => AppError::ConversionFailed(other.to_string()),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::SchemaValidationFailed { .. } | LlmError::EmptyContent => {
                AppError::SchemaValidation(e.to_string())
            }
            LlmError::Network(_) | LlmError::Api { .. } | LlmError::Config(_) => {
                AppError::Network(e.to_string())
            }
        }
    }
}

impl From<BatchError> for AppError {
    fn from(e: BatchError) -> Self {
        AppError::from(e.source).context(format!("Error scoring resume '{}'", e.identity))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
            other => {
                tracing::error!("Request failed [{}]: {other}", other.code());
                (StatusCode::BAD_REQUEST, other.to_string())
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(error: AppError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_domain_errors_are_bad_request_with_message() {
        let (status, body) = body_json(AppError::MalformedInput("bad criteria".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "bad criteria"}));
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) = body_json(AppError::Internal(anyhow::anyhow!("secret path"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body["error"].as_str().unwrap().contains("secret"));
    }

    #[test]
    fn test_llm_errors_keep_their_kind() {
        let schema = AppError::from(LlmError::SchemaValidationFailed {
            schema: "resume_score",
            attempts: 3,
            last_error: "missing field `scores`".into(),
        });
        assert!(matches!(schema, AppError::SchemaValidation(_)));

        let api = AppError::from(LlmError::Api {
            status: 503,
            message: "overloaded".into(),
        });
        assert!(matches!(api, AppError::Network(_)));
    }

    #[test]
    fn test_raster_errors_map_to_format_or_conversion() {
        let unsupported = AppError::from(RasterError::UnsupportedFormat(".txt".into()));
        assert_eq!(unsupported.to_string(), "Unsupported file type: .txt");

        let failed = AppError::from(RasterError::ConversionFailed {
            tool: "libreoffice".into(),
            diagnostics: "boom".into(),
        });
        assert!(matches!(failed, AppError::ConversionFailed(ref m) if m == "libreoffice failed: boom"));
    }

    #[tokio::test]
    async fn test_panicked_encode_task_is_internal() {
        let join_error = tokio::spawn(async { panic!("encoder blew up") })
            .await
            .unwrap_err();
        let err = AppError::from(RasterError::Task(join_error));
        assert!(matches!(err, AppError::Internal(_)));

        let (status, _) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_context_prefixes_and_keeps_kind() {
        let err = AppError::ConversionFailed("boom".into()).context("Error processing file bob.docx");
        assert!(matches!(err, AppError::ConversionFailed(_)));
        assert_eq!(err.to_string(), "Error processing file bob.docx: boom");
    }
}
