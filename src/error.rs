//! Error types shared across the store, extraction and HTTP layers.

use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

/// Failures of the backing task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the database file failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The database file could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No task with this id exists.
    #[error("task not found: {0}")]
    NotFound(Uuid),
}

/// Failures of the natural-language extraction call.
///
/// These never reach users; the normalizer degrades to a fallback draft.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// No API key configured.
    #[error("extraction service is not configured")]
    MissingApiKey,

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The payload was not the JSON shape we asked for.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        message: String,
    },

    /// The service answered without any text.
    #[error("no response from extraction service")]
    EmptyResponse,

    /// The payload parsed but is unusable (e.g. blank title).
    #[error("invalid extraction: {0}")]
    Invalid(String),
}

/// Errors returned from HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("task not found")]
    NotFound,

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
