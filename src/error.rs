//! # Error Handling
//!
//! HTTP-facing error type for the collaborator surface. Every variant maps to
//! a status code and a structured `{error: {code, message}}` JSON body; the
//! protocol core never uses this type; its failures stay inside the session
//! (see the error policy notes in `websocket.rs`).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Application-level errors returned by HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    /// Resource lookup miss with a machine-readable code, e.g.
    /// `unknown_conversation`.
    NotFound { code: &'static str, message: String },
    ConfigError(String),
}

impl AppError {
    /// 404 for a conversation id with no stored record.
    pub fn unknown_conversation(conversation_id: &str) -> Self {
        AppError::NotFound {
            code: "unknown_conversation",
            message: format!(
                "No conversation found for conversation ID '{}'. Please verify the ID and try again.",
                conversation_id
            ),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound { message, .. } => write!(f, "Not found: {}", message),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, code, message) = match self {
            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::NotFound { code, message } => {
                (StatusCode::NOT_FOUND, *code, message.clone())
            }
            AppError::ConfigError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone())
            }
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_conversation_body() {
        let err = AppError::unknown_conversation("abc-123");
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        match err {
            AppError::NotFound { code, message } => {
                assert_eq!(code, "unknown_conversation");
                assert!(message.contains("'abc-123'"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_anyhow_conversion_is_internal() {
        let err: AppError = anyhow::anyhow!("store offline").into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(
            err.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
