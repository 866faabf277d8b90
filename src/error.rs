use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::feeds::FeedError;
use crate::store::StoreError;

/// Request-scoped failures. Intelligence, content and auth routes answer
/// with `{"message"}` bodies, item routes with `{"error"}` bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Failed to process RSS feed: {0}")]
    Feed(#[from] FeedError),
    #[error("{0}")]
    InvalidItem(String),
    #[error("Airtable not configured.")]
    StoreNotConfigured,
    #[error("{message} {source}")]
    Store {
        message: &'static str,
        source: StoreError,
    },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidItem(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Feed(_) | ApiError::StoreNotConfigured | ApiError::Store { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{}", self);
        }

        let body = match &self {
            ApiError::BadRequest(message) | ApiError::Unauthorized(message) => {
                json!({ "message": message })
            }
            ApiError::Feed(source) => json!({
                "message": "Failed to process RSS feed.",
                "error": source.to_string(),
            }),
            ApiError::InvalidItem(message) => json!({ "error": message }),
            ApiError::StoreNotConfigured => json!({ "error": self.to_string() }),
            ApiError::Store { message, source } => json!({
                "error": message,
                "details": source.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn render(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_body() {
        let (status, body) = render(ApiError::BadRequest("Topic is required.".into())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "message": "Topic is required." }));
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let (status, body) = render(ApiError::Unauthorized("nope".into())).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "nope");
    }

    #[tokio::test]
    async fn test_feed_error_passes_message_through() {
        let err = ApiError::Feed(FeedError::Status(reqwest::StatusCode::BAD_GATEWAY));
        let (status, body) = render(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Failed to process RSS feed.");
        assert_eq!(body["error"], "Status code 502");
    }

    #[tokio::test]
    async fn test_invalid_item_body() {
        let (status, body) = render(ApiError::InvalidItem("No item data provided.".into())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "No item data provided." }));
    }

    #[tokio::test]
    async fn test_store_not_configured_body() {
        let (status, body) = render(ApiError::StoreNotConfigured).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Airtable not configured." }));
    }

    #[tokio::test]
    async fn test_store_error_details() {
        let err = ApiError::Store {
            message: "Failed to fetch data from Airtable.",
            source: StoreError::Api {
                status: 404,
                message: "Could not find table Nope".to_string(),
            },
        };
        let (status, body) = render(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch data from Airtable.");
        assert_eq!(body["details"], "Could not find table Nope");
    }
}
