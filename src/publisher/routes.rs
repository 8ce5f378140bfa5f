//! Gateway HTTP routes

use super::AppState;
use crate::health;
use crate::metrics::PublishSource;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Fixed reply timeout for `POST /request`
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Query parameters accepted by `/publish` and `/request`
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    pub subject: Option<String>,
    pub message: Option<String>,
}

impl MessageQuery {
    /// Fill in the default subject and a timestamped placeholder message.
    /// Empty parameters count as absent.
    pub fn resolve(self, default_subject: &str) -> (String, String) {
        let subject = self
            .subject
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_subject.to_string());
        let message = self
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("New message published at {}", timestamp()));
        (subject, message)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Broker failure surfaced to the HTTP caller
#[derive(Debug, Clone, Copy)]
enum ApiError {
    Publish,
    Request,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = match self {
            Self::Publish => "Failed to publish message",
            Self::Request => "Failed to request message",
        };
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: error.to_string(),
            }),
        )
            .into_response()
    }
}

/// Gateway router: message routes plus health endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/publish", post(publish_handler))
        .route("/request", post(request_handler))
        .merge(health::routes())
        .with_state(state)
}

/// Fire-and-forget publish
async fn publish_handler(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (subject, message) = query.resolve(&state.config.default_subject);

    match state.broker.publish(&subject, Bytes::from(message)).await {
        Ok(()) => {
            state.metrics.record_publish(PublishSource::Http);
            info!(subject = %subject, "Message published");
            Ok(Json(MessageResponse {
                message: "Message published".to_string(),
            }))
        }
        Err(e) => {
            state.metrics.record_error(&e);
            error!(subject = %subject, error = %e, "Failed to publish message");
            Err(ApiError::Publish)
        }
    }
}

/// Request/reply with a fixed timeout; the reply payload is returned as-is
async fn request_handler(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (subject, message) = query.resolve(&state.config.default_subject);

    match state
        .broker
        .request(&subject, Bytes::from(message), REQUEST_TIMEOUT)
        .await
    {
        Ok(reply) => {
            state.metrics.record_request(true);
            info!(subject = %subject, "Reply received");
            Ok(Json(MessageResponse {
                message: reply.payload_str().into_owned(),
            }))
        }
        Err(e) => {
            state.metrics.record_request(false);
            state.metrics.record_error(&e);
            error!(subject = %subject, error = %e, "Failed to request message");
            Err(ApiError::Request)
        }
    }
}

/// Local wall-clock time, to the second
pub(crate) fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
