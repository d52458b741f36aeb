use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::error::AppError;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Turns service errors into JSON error responses.
#[derive(Debug, Clone, Copy)]
pub struct ErrorTranslator {
    /// Expose messages of 5xx errors.
    pub internal_errors: bool,
    /// Attach the error trace to the body.
    pub stack_traces: bool,
}

impl Default for ErrorTranslator {
    fn default() -> Self {
        Self {
            internal_errors: true,
            stack_traces: true,
        }
    }
}

impl ErrorTranslator {
    pub fn new(internal_errors: bool, stack_traces: bool) -> Self {
        Self {
            internal_errors,
            stack_traces,
        }
    }

    /// Explicit status, else 400 for validation errors and 500 for the rest.
    pub fn status_for(err: &AppError) -> StatusCode {
        err.status().unwrap_or_else(|| {
            if err.name().contains("ValidationError") {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        })
    }

    pub fn body_for(&self, err: &AppError, status: StatusCode) -> Value {
        let message = if status.is_server_error() && !self.internal_errors {
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            err.to_string()
        };

        let mut error = Map::new();
        error.insert("message".to_string(), Value::String(message));
        error.insert("name".to_string(), Value::String(err.name().to_string()));
        error.insert("code".to_string(), json!(status.as_u16()));

        if let Some(validation) = err.validation_error() {
            error.insert("details".to_string(), json!(validation.details));
        }
        if self.stack_traces {
            error.insert("stack".to_string(), Value::String(err.trace()));
        }

        json!({ "error": error })
    }

    pub fn respond(&self, err: AppError) -> Response {
        let status = Self::status_for(&err);
        if status.is_server_error() {
            err.log_error();
        } else {
            err.log_warn();
        }
        (status, Json(self.body_for(&err, status))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::validation::{FailureKind, Section, ValidationError};

    #[test]
    fn validation_errors_without_status_become_400() {
        let err = AppError::from(ValidationError::single(
            Section::Body,
            "title",
            FailureKind::Required,
            "\"title\" is required",
        ));
        let status = ErrorTranslator::status_for(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = ErrorTranslator::default().body_for(&err, status);
        assert_eq!(body["error"]["message"], "\"title\" is required");
        assert_eq!(body["error"]["details"][0]["kind"], "required");
        assert_eq!(body["error"]["details"][0]["section"], "body");
    }

    #[test]
    fn internal_messages_are_hidden_when_disabled() {
        let err = AppError::internal("connection string leaked");
        let status = ErrorTranslator::status_for(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorTranslator::new(false, false).body_for(&err, status);
        assert_eq!(body["error"]["message"], INTERNAL_ERROR_MESSAGE);
        assert!(body["error"].get("stack").is_none());
    }

    #[test]
    fn client_errors_keep_their_message() {
        let err = AppError::not_found("Issue", "abc");
        let status = ErrorTranslator::status_for(&err);
        let body = ErrorTranslator::new(false, true).body_for(&err, status);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Issue \"abc\" was not found");
        assert!(body["error"]["stack"].as_str().unwrap().starts_with("IssueNotFoundError"));
    }
}
