//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                   - Liveness
//! GET    /health/ready             - Store reachable
//!
//! # Catalog
//! GET    /booksData?category=1,2   - Books in any of the categories (all if omitted)
//! GET    /booksData/{id}           - One book
//! PATCH  /booksData/{id}           - Partial update, bumps booksVersion
//! GET    /booksVersion             - {"booksVersion": n}
//! GET    /categories               - All categories
//! GET    /categories/{id}          - One category
//!
//! # Users
//! GET    /users?key=value          - Users matching every pair
//! POST   /users                    - Register (201)
//! GET    /users/{id}               - One user
//! PATCH  /users/{id}               - Merge fields
//! GET    /users/{id}/settings      - Settings object
//! POST   /users/{id}/settings      - Shallow-merge settings
//!
//! # Cart
//! GET    /cart/{userId}            - Lines of a user
//! POST   /cart/{userId}            - Add {bookId, quantity} (201, 409 if out of stock)
//! DELETE /cart/{userId}            - Clear, {"deleted": n}
//! PATCH  /cart/{userId}/{itemId}   - Set {quantity}
//! DELETE /cart/{userId}/{itemId}   - Remove, {"deleted": true}
//!
//! # Orders
//! POST   /orders                   - Place an order and clear the cart (201)
//! GET    /orders/user/{userId}     - Orders of a user, newest first
//! GET    /orders/{orderId}         - One order
//! ```

pub mod books;
pub mod cart;
pub mod categories;
pub mod orders;
pub mod users;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{cors_layer, request_id_middleware};
use crate::state::AppState;

/// Every route, for the start-up log.
pub const ROUTES: &[&str] = &[
    "GET    /health",
    "GET    /health/ready",
    "GET    /booksData",
    "GET    /booksData/{id}",
    "PATCH  /booksData/{id}",
    "GET    /booksVersion",
    "GET    /categories",
    "GET    /categories/{id}",
    "GET    /users",
    "POST   /users",
    "GET    /users/{id}",
    "PATCH  /users/{id}",
    "GET    /users/{id}/settings",
    "POST   /users/{id}/settings",
    "GET    /cart/{userId}",
    "POST   /cart/{userId}",
    "DELETE /cart/{userId}",
    "PATCH  /cart/{userId}/{itemId}",
    "DELETE /cart/{userId}/{itemId}",
    "POST   /orders",
    "GET    /orders/user/{userId}",
    "GET    /orders/{orderId}",
];

/// All API routes, without middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(books::routes())
        .merge(categories::routes())
        .merge(users::routes())
        .merge(cart::routes())
        .merge(orders::routes())
}

/// The complete application: routes, health checks and the middleware stack.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(state.config().cors_origin.as_deref());

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(cors)
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check the store.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, store = %state.store().kind(), "store not ready");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
