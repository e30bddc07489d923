//! Error types for nki-generator.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Main error type for packaging operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The request carried no sample files.
    #[error("No WAV files uploaded.")]
    NoSamples,

    /// The root note has no entry in the template map.
    #[error("Unsupported root note: {0}")]
    UnsupportedRootNote(String),

    /// The request body exceeded the configured upload limit (bytes).
    #[error("Upload exceeds the {0} byte limit.")]
    PayloadTooLarge(usize),

    /// Caller-supplied data is unusable for another reason.
    #[error("{0}")]
    InvalidRequest(String),

    /// The template for a mapped root note is not provisioned on disk.
    #[error(
        "NKI template not found on server: {0}. Upload it into the template directory configured for this server."
    )]
    TemplateNotFound(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip writer error.
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Blocking staging task panicked or was cancelled.
    #[error("staging task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid service configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP server setup or runtime error.
    #[error("server error: {0}")]
    Server(String),
}

impl Error {
    /// HTTP status this error is surfaced with.
    ///
    /// Client-input problems are 400 (413 for oversized uploads); everything
    /// else means the server needs an operational fix and is 500.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NoSamples | Error::UnsupportedRootNote(_) | Error::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Error::TemplateNotFound(_)
            | Error::Io(_)
            | Error::Zip(_)
            | Error::Task(_)
            | Error::Config(_)
            | Error::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}
