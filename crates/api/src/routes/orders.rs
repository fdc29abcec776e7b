//! Order handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::instrument;

use bookshelf_core::{NewOrder, Order, OrderId, UserId};

use crate::error::Result;
use crate::extract::{ApiJson, ApiPath};
use crate::services;
use crate::state::AppState;

/// Build the orders router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders/user/{user_id}", get(list_orders))
        .route("/orders/{order_id}", get(get_order))
}

/// Place an order from the posted items and clear the user's cart.
///
/// # Errors
///
/// Returns 400 if `userId` or `items` is missing.
#[instrument(skip(state, request))]
pub async fn place_order(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NewOrder>,
) -> Result<(StatusCode, Json<Order>)> {
    let order = services::place_order(&state, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Orders of a user, newest first.
///
/// # Errors
///
/// Returns 500 if the store cannot be read.
#[instrument(skip(state))]
pub async fn list_orders(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(state.store().list_orders(&user_id).await?))
}

/// # Errors
///
/// Returns 404 if the order does not exist.
#[instrument(skip(state))]
pub async fn get_order(
    State(state): State<AppState>,
    ApiPath(order_id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.store().get_order(&order_id).await?))
}
