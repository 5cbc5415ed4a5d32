//! Error types for the document chat service

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of the service
#[derive(Error, Debug)]
pub enum Error {
    /// Uploaded bytes could not be parsed as a document. Terminal for ingestion.
    #[error("Document load error: {0}")]
    DocumentLoad(String),

    /// Document page count exceeds the subscription plan limit.
    /// Checked before any embedding call is made.
    #[error("Quota exceeded: document has {unit_count} pages, plan allows {max_units}")]
    QuotaExceeded { unit_count: usize, max_units: usize },

    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index failure
    #[error("Vector index error: {0}")]
    Index(String),

    /// Retrieval failed before generation could start
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Streaming generation failed mid-flight
    #[error("Generation stream error: {0}")]
    GenerationStream(String),

    /// SQLite storage failure
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed client request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No resolved user identity
    #[error("Unauthorized")]
    Unauthorized,

    /// Service is saturated; the request can be retried later
    #[error("Service busy: {0}")]
    Busy(String),

    /// Document or resource not found for this owner
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::DocumentLoad(_) => (StatusCode::UNPROCESSABLE_ENTITY, "document_load_error"),
            Error::QuotaExceeded { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "quota_exceeded"),
            Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_error"),
            Error::Index(_) => (StatusCode::INTERNAL_SERVER_ERROR, "index_error"),
            Error::Retrieval(_) => (StatusCode::BAD_GATEWAY, "retrieval_error"),
            Error::GenerationStream(_) => (StatusCode::BAD_GATEWAY, "generation_error"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Busy(_) => (StatusCode::SERVICE_UNAVAILABLE, "busy"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            Error::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::NotFound("doc".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::QuotaExceeded { unit_count: 10, max_units: 5 }
                .into_response()
                .status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::GenerationStream("upstream".into())
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Busy("queue full".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_quota_message_names_both_counts() {
        let err = Error::QuotaExceeded { unit_count: 6, max_units: 5 };
        let msg = err.to_string();
        assert!(msg.contains('6'));
        assert!(msg.contains('5'));
    }
}
