//! `POST /otp/send` and `POST /otp/verify`.

use std::sync::Arc;

use axum::{Json, Router, body::Bytes, extract::State, routing::post};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tower_http::cors::CorsLayer;
use tracing::instrument;

use bookshelf_core::serde_helpers::lenient_string;

use crate::config::OtpConfig;
use crate::error::OtpError;
use crate::store::{OtpStore, mask_phone};

/// Shared state for the OTP handlers.
#[derive(Clone)]
pub struct OtpState {
    inner: Arc<OtpStateInner>,
}

struct OtpStateInner {
    store: OtpStore,
    ttl_secs: u64,
}

impl OtpState {
    #[must_use]
    pub fn new(config: &OtpConfig) -> Self {
        Self {
            inner: Arc::new(OtpStateInner {
                store: OtpStore::new(config.ttl),
                ttl_secs: config.ttl_secs(),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &OtpStore {
        &self.inner.store
    }
}

/// Body of `POST /otp/send`. The phone may be a string or a number.
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SendResponse {
    pub ok: bool,
    pub phone: String,
    pub masked: String,
    pub ttl: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct VerifyResponse {
    pub ok: bool,
}

/// The OTP application with permissive CORS.
pub fn app(state: OtpState) -> Router {
    Router::new()
        .route("/otp/send", post(send))
        .route("/otp/verify", post(verify))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, OtpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| OtpError::InvalidBody(e.to_string()))
}

/// Issue a code for a phone. The code itself is only written to the log.
///
/// # Errors
///
/// Returns 400 if the phone is missing.
#[instrument(skip(state, body))]
pub async fn send(
    State(state): State<OtpState>,
    body: Bytes,
) -> Result<Json<SendResponse>, OtpError> {
    let request: SendRequest = parse_body(&body)?;
    let phone = request.phone.trim();
    if phone.is_empty() {
        return Err(OtpError::MissingPhone);
    }

    let code = state.store().issue(phone);
    tracing::info!(phone = %phone, code = %code, "otp issued");

    Ok(Json(SendResponse {
        ok: true,
        phone: phone.to_string(),
        masked: mask_phone(phone),
        ttl: state.inner.ttl_secs,
    }))
}

/// Check a code; a successful check consumes it.
///
/// # Errors
///
/// Returns 400 if a field is missing, 404 if no code is pending, 410 if it
/// expired and 401 if it does not match.
#[instrument(skip(state, body))]
pub async fn verify(
    State(state): State<OtpState>,
    body: Bytes,
) -> Result<Json<VerifyResponse>, OtpError> {
    let request: VerifyRequest = parse_body(&body)?;
    let phone = request.phone.trim();
    let code = request.code.trim();
    if phone.is_empty() || code.is_empty() {
        return Err(OtpError::MissingFields);
    }

    state.store().verify(phone, code)?;
    tracing::info!(phone = %phone, "otp verified");
    Ok(Json(VerifyResponse { ok: true }))
}
