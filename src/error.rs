use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    // Domain validation errors
    SelfFollow,
    AlreadyFollowing,
    NotFollowing,
    EmptyComment,
    // Resource errors. PermissionDenied and NotFound share one HTTP
    // surface so callers cannot probe which resources exist.
    PermissionDenied,
    NotFound(String),
    // Ambient errors
    Validation(String),
    Database(anyhow::Error),
    Configuration(String),
    Internal(String),
}

impl AppError {
    /// Stable machine-readable reason code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::SelfFollow => "self_follow",
            AppError::AlreadyFollowing => "already_following",
            AppError::NotFollowing => "not_following",
            AppError::EmptyComment => "empty_comment",
            AppError::PermissionDenied => "not_found",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Database(_) => "internal",
            AppError::Configuration(_) => "internal",
            AppError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::SelfFollow => write!(f, "A profile cannot follow itself"),
            AppError::AlreadyFollowing => write!(f, "Already following this profile"),
            AppError::NotFollowing => write!(f, "Not following this profile"),
            AppError::EmptyComment => write!(f, "Comment content must not be empty"),
            AppError::PermissionDenied => write!(f, "Permission denied"),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Database(err) => write!(f, "Database error: {}", err),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match &self {
            AppError::SelfFollow
            | AppError::AlreadyFollowing
            | AppError::NotFollowing
            | AppError::EmptyComment => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // Same status and body for "forbidden" and "missing" so the
            // response does not reveal whether the resource exists.
            AppError::PermissionDenied => {
                tracing::debug!("Permission denied surfaced as not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }
            AppError::NotFound(msg) => {
                tracing::debug!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(anyhow::Error::new(err))
    }
}

pub type AppResult<T> = Result<T, AppError>;
