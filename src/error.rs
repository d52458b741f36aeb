use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use thiserror::Error;

use crate::server::validation::ValidationError;

/// Everything that can go wrong inside the service layer.
///
/// Variants that map to a well-known client error carry an explicit status
/// (see [`AppError::status`]). Infrastructure failures carry none and the
/// error translator derives their status from the error name.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("{0}")]
    Validation(ValidationError),

    #[error("{entity} \"{id}\" was not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Issue \"{0}\" has been deleted")]
    IssueDeleted(String),

    #[error("Endpoint not found ({method} {path})")]
    RouteNotFound { method: String, path: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Upload { message: String, status: StatusCode },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Database(#[from] mongodb::error::Error),

    #[error(transparent)]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Service error with a once-only logging flag.
///
/// The same instance can travel through several layers (document store
/// rollback, registrar, translator); whichever layer logs it first wins.
pub struct AppError {
    kind: ErrorKind,
    logged: AtomicBool,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            logged: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound {
            entity,
            id: id.to_string(),
        })
    }

    pub fn route_not_found(method: impl fmt::Display, path: impl Into<String>) -> Self {
        Self::new(ErrorKind::RouteNotFound {
            method: method.to_string(),
            path: path.into(),
        })
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict(message.into()))
    }

    pub fn bad_upload(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upload {
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        })
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized(message.into()))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden(message.into()))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration(message.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(anyhow::anyhow!(message.into())))
    }

    /// Explicit status code, if this kind of error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match &self.kind {
            ErrorKind::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            ErrorKind::IssueDeleted(_) => Some(StatusCode::BAD_REQUEST),
            ErrorKind::RouteNotFound { .. } => Some(StatusCode::NOT_FOUND),
            ErrorKind::Conflict(_) => Some(StatusCode::CONFLICT),
            ErrorKind::Upload { status, .. } => Some(*status),
            ErrorKind::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED),
            ErrorKind::Forbidden(_) => Some(StatusCode::FORBIDDEN),
            ErrorKind::Validation(_)
            | ErrorKind::Configuration(_)
            | ErrorKind::Database(_)
            | ErrorKind::Bson(_)
            | ErrorKind::Io(_)
            | ErrorKind::Internal(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match &self.kind {
            ErrorKind::Validation(_) => "ValidationError",
            ErrorKind::NotFound { entity, .. } => match *entity {
                "Issue" => "IssueNotFoundError",
                "Document" => "DocumentNotFoundError",
                "User" => "UserNotFoundError",
                _ => "NotFoundError",
            },
            ErrorKind::IssueDeleted(_) => "IssueDeletedError",
            ErrorKind::RouteNotFound { .. } => "EndpointNotFoundError",
            ErrorKind::Conflict(_) => "ConflictError",
            ErrorKind::Upload { .. } => "UploadError",
            ErrorKind::Unauthorized(_) => "UnauthorizedError",
            ErrorKind::Forbidden(_) => "ForbiddenError",
            ErrorKind::Configuration(_) => "ConfigurationError",
            ErrorKind::Database(_) | ErrorKind::Bson(_) => "DatabaseError",
            ErrorKind::Io(_) => "IoError",
            ErrorKind::Internal(_) => "InternalError",
        }
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.kind {
            ErrorKind::Validation(err) => Some(err),
            _ => None,
        }
    }

    /// Source chain rendered one cause per line, outermost first.
    pub fn trace(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.name(), self.kind)];
        let mut source = std::error::Error::source(&self.kind);
        while let Some(cause) = source {
            lines.push(format!("    caused by: {}", cause));
            source = cause.source();
        }
        lines.join("\n")
    }

    /// Returns false if this instance has already been logged.
    fn mark_logged(&self) -> bool {
        !self.logged.swap(true, Ordering::SeqCst)
    }

    pub fn is_logged(&self) -> bool {
        self.logged.load(Ordering::SeqCst)
    }

    pub fn log_error(&self) {
        if self.mark_logged() {
            tracing::error!(error_name = self.name(), trace = %self.trace(), "{}", self.kind);
        }
    }

    pub fn log_warn(&self) {
        if self.mark_logged() {
            match self.status() {
                Some(status) => {
                    tracing::warn!("[{} {}] {}", self.name(), status.as_u16(), self.kind)
                }
                None => tracing::warn!("[{}] {}", self.name(), self.kind),
            }
        }
    }
}

impl fmt::Debug for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppError")
            .field("name", &self.name())
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::new(ErrorKind::Validation(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::new(ErrorKind::Database(err))
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        Self::new(ErrorKind::Bson(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(ErrorKind::Internal(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Internal(err.into()))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::new(ErrorKind::Internal(err.into()))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::new(ErrorKind::Internal(err.into()))
    }
}
