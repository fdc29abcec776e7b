//! Extractors whose rejections render through [`AppError`].
//!
//! axum's stock extractors answer malformed input with plain-text 400/422
//! responses; these wrap them so every client error has the same
//! `{"error": "..."}` body and status 400.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::AppError;

/// JSON body extractor and response.
#[derive(Debug, Clone, Copy, Default, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

/// Query string extractor.
#[derive(Debug, Clone, Copy, Default, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameter extractor.
#[derive(Debug, Clone, Copy, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        routing::post,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;

    #[derive(Debug, Deserialize, Serialize)]
    struct Payload {
        quantity: i64,
    }

    fn app() -> Router {
        Router::new().route(
            "/echo/{n}",
            post(|ApiPath(n): ApiPath<u32>, ApiJson(body): ApiJson<Payload>| async move {
                ApiJson(serde_json::json!({"n": n, "quantity": body.quantity}))
            }),
        )
    }

    async fn send(uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_valid_request() {
        let (status, body) = send("/echo/4", r#"{"quantity": 2}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"n": 4, "quantity": 2}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (status, body) = send("/echo/4", "{quantity").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = send("/echo/4", r#"{"quantity": "many"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_path_is_bad_request() {
        let (status, body) = send("/echo/four", r#"{"quantity": 2}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
