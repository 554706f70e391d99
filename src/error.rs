use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("steps must be at least 1")]
    InvalidSteps,
    #[error("cannot rollback {requested} steps, only {available} previous states available")]
    InsufficientHistory { requested: usize, available: usize },
    #[error("model call failed: {0}")]
    Model(#[source] anyhow::Error),
    #[error("agent stopped after {0} model calls without a final answer")]
    IterationLimit(u32),
    #[error("agent run exceeded {0:?}")]
    Timeout(Duration),
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::EmptyQuery | ChatError::InvalidSteps | ChatError::InsufficientHistory { .. } => {
                StatusCode::BAD_REQUEST
            }
            ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ChatError::Model(_) | ChatError::IterationLimit(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status();
        // client errors carry their own short message; internal details stay in the logs
        let detail = if status.is_client_error() {
            self.to_string()
        } else {
            "I apologize, something went wrong while processing your request. Please try again.".to_string()
        };
        (status, Json(json!({"detail": detail}))).into_response()
    }
}
