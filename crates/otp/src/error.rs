//! OTP errors and their HTTP rendering.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Why a send or verify request was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OtpError {
    #[error("invalid body: {0}")]
    InvalidBody(String),

    #[error("phone required")]
    MissingPhone,

    #[error("phone and code required")]
    MissingFields,

    /// No code was sent to this phone, or it was already used.
    #[error("not found")]
    NotFound,

    #[error("expired")]
    Expired,

    /// The code does not match. The pending code stays valid.
    #[error("invalid")]
    Invalid,
}

impl OtpError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) | Self::MissingPhone | Self::MissingFields => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Expired => StatusCode::GONE,
            Self::Invalid => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for OtpError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "otp request refused");
        let body = Json(json!({ "ok": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
