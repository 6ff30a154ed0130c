use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// The error taxonomy for the hub daemon's HTTP surface.
///
/// Each variant maps to exactly one `code` string and one HTTP status.
/// Validation, conflict, and not-found variants abort the enclosing
/// transaction before any row is written or event emitted.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("missing bearer token")]
    MissingAuth,

    #[error("invalid bearer token")]
    InvalidAuth,

    #[error("daemon started without an auth token")]
    NoAuthConfigured,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("name already taken: {0}")]
    NameTaken(String),

    #[error("version conflict, current version is {current}")]
    VersionConflict { current: i64 },

    #[error("message already deleted")]
    AlreadyDeleted,

    #[error("move would change channel")]
    CrossChannelMove,

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("daemon is shutting down")]
    ShuttingDown,

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("internal error")]
    Internal,
}

impl AppError {
    /// The stable `code` string surfaced in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingAuth => "MISSING_AUTH",
            AppError::InvalidAuth => "INVALID_AUTH",
            AppError::NoAuthConfigured => "NO_AUTH_CONFIGURED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "INVALID_INPUT",
            AppError::NameTaken(_) => "NAME_TAKEN",
            AppError::VersionConflict { .. } => "VERSION_CONFLICT",
            AppError::AlreadyDeleted => "ALREADY_DELETED",
            AppError::CrossChannelMove => "CROSS_CHANNEL_MOVE",
            AppError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            AppError::RateLimited { .. } => "RATE_LIMITED",
            AppError::ShuttingDown => "SHUTTING_DOWN",
            AppError::Database(_) | AppError::Migration(_) | AppError::Internal => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::MissingAuth | AppError::InvalidAuth => StatusCode::UNAUTHORIZED,
            AppError::NoAuthConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::CrossChannelMove => StatusCode::BAD_REQUEST,
            AppError::NameTaken(_)
            | AppError::VersionConflict { .. }
            | AppError::AlreadyDeleted => StatusCode::CONFLICT,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Migration(_) | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Database(ref e) = self {
            tracing::error!(error = ?e, "database error");
        }

        let status = self.status();
        let code = self.code();
        let message = self.to_string();

        let mut body = json!({ "code": code, "message": message });
        if let AppError::VersionConflict { current } = self {
            body["details"] = json!({ "current": current });
        }
        if let AppError::RateLimited { retry_after_secs } = self {
            body["details"] = json!({ "retry_after_secs": retry_after_secs });
        }

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
