//! HTTP middleware stack for the API.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. CORS
//! 3. `TraceLayer` (the `http_request` span)
//! 4. Request ID (recorded on that span)

pub mod request_id;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};

/// CORS for browser clients.
///
/// Any origin is allowed unless `origin` names a single one. An origin that
/// is not a valid header value falls back to any origin with a warning.
#[must_use]
pub fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(value)) => layer.allow_origin(value),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "invalid CORS origin, allowing any origin");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}
