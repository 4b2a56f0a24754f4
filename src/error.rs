//! Error type shared by the registry, the use cases and the HTTP layer

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Delay advertised in `Retry-After` when an enrichment is still pending
pub const RETRY_AFTER_MS: u64 = 500;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid URL: {0}")]
    InvalidInput(String),

    #[error("URL is not safe: {0}")]
    Unsafe(String),

    #[error("short link not found: {0}")]
    NotFound(String),

    #[error("{what} not available yet for {hash}")]
    NotYetAvailable { hash: String, what: &'static str },

    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("hashing error: {0}")]
    Hashing(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AppError {
                fn from(e: $ty) -> Self {
                    AppError::Storage(e.into())
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::NotYetAvailable { .. } => StatusCode::BAD_REQUEST,
            AppError::Unsafe(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Serialization(_) | AppError::Hashing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Unsafe(_) => "unsafe",
            AppError::NotFound(_) => "not_found",
            AppError::NotYetAvailable { .. } => "not_yet_available",
            AppError::Storage(_) | AppError::Serialization(_) | AppError::Hashing(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "statusCode": status.as_u16(),
            "code": self.code(),
            "error": self.to_string(),
        }));

        match self {
            AppError::NotYetAvailable { .. } => {
                (status, [(header::RETRY_AFTER, RETRY_AFTER_MS.to_string())], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
