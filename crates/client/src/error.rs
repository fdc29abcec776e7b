//! Client-side errors.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by [`crate::ApiClient`] and the services built on it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the response not read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Reading or writing the catalog snapshot failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// The HTTP status, if the API answered at all.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the API refused with 409 (e.g. out of stock).
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.status(), Some(s) if s == StatusCode::CONFLICT.as_u16())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(s) if s == StatusCode::NOT_FOUND.as_u16())
    }
}
