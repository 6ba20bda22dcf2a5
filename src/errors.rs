use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

const REDACTED_TRACEBACK: &str = "Traceback hidden; enable debug mode to include error details";

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by the forecast API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "parsing forecast request: Unknown datetime string format, unable to parse: 2024-13-45",
    "traceback": "parsing forecast request\n\nCaused by:\n    Unknown datetime string format, unable to parse: 2024-13-45"
}))]
pub struct ErrorResponse {
    /// Human-readable error description
    pub error: String,
    /// Error chain, present on internal errors only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Client-side problem with the request
    #[error("{0}")]
    BadRequest(String),

    /// Any failure while processing an otherwise accepted request
    #[error("{error:#}")]
    Internal {
        error: anyhow::Error,
        /// Include the full error chain in the response
        verbose: bool,
    },
}

impl ApiError {
    pub fn internal(error: impl Into<anyhow::Error>) -> Self {
        ApiError::Internal {
            error: error.into(),
            verbose: true,
        }
    }

    /// Sets whether internal errors expose their traceback.
    pub fn verbose(self, verbose: bool) -> Self {
        match self {
            ApiError::Internal { error, .. } => ApiError::Internal { error, verbose },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the body without consuming the error.
    pub fn body(&self) -> ErrorResponse {
        match self {
            ApiError::BadRequest(message) => ErrorResponse {
                error: message.clone(),
                traceback: None,
            },
            ApiError::Internal { error, verbose } => {
                let traceback = if *verbose {
                    format!("{:?}", error)
                } else {
                    REDACTED_TRACEBACK.to_string()
                };
                ErrorResponse {
                    error: non_empty(format!("{:#}", error)),
                    traceback: Some(non_empty(traceback)),
                }
            }
        }
    }
}

fn non_empty(text: String) -> String {
    if text.trim().is_empty() {
        "Internal server error".to_string()
    } else {
        text
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let request_id = current_request_id();
        match &self {
            ApiError::BadRequest(message) => {
                warn!(request_id = ?request_id, %message, "Rejected forecast request");
            }
            ApiError::Internal { error, .. } => {
                error!(request_id = ?request_id, error = ?error, "Forecast request failed");
            }
        }

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn nested_failure() -> anyhow::Error {
        Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"))
            .context("fitting model")
            .unwrap_err()
    }

    #[tokio::test]
    async fn bad_request_has_only_error_field() {
        let response = ApiError::BadRequest("No sales data provided".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"error": "No sales data provided"}));
    }

    #[tokio::test]
    async fn internal_error_carries_cause_chain() {
        let response = ApiError::internal(nested_failure()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "fitting model: disk on fire");
        let traceback = json["traceback"].as_str().unwrap();
        assert!(traceback.contains("Caused by"));
        assert!(traceback.contains("disk on fire"));
    }

    #[tokio::test]
    async fn quiet_mode_hides_the_chain() {
        let response = ApiError::internal(nested_failure())
            .verbose(false)
            .into_response();
        let json = body_json(response).await;
        assert_eq!(json["traceback"], REDACTED_TRACEBACK);
        assert!(!json["error"].as_str().unwrap().is_empty());
    }

    #[test]
    fn verbose_flag_leaves_bad_requests_alone() {
        let err = ApiError::BadRequest("nope".into()).verbose(false);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.body().traceback.is_none());
    }
}
