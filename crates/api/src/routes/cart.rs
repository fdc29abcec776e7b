//! Cart handlers.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, patch},
};
use serde_json::{Value, json};
use tracing::instrument;

use bookshelf_core::{AddCartLine, CartItem, CartItemId, SetCartQuantity, UserId};

use crate::error::Result;
use crate::extract::{ApiJson, ApiPath};
use crate::services;
use crate::state::AppState;

/// Build the cart router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/cart/{user_id}",
            get(list_cart).post(add_to_cart).delete(clear_cart),
        )
        .route(
            "/cart/{user_id}/{item_id}",
            patch(set_quantity).delete(remove_line),
        )
}

/// # Errors
///
/// Returns 500 if the store cannot be read.
#[instrument(skip(state))]
pub async fn list_cart(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Vec<CartItem>>> {
    Ok(Json(state.store().list_cart(&user_id).await?))
}

/// Add a book to the cart, or more of it.
///
/// # Errors
///
/// Returns 400 for a missing `bookId` or bad quantity, 404 for an unknown
/// book and 409 if the book is out of stock.
#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(line): ApiJson<AddCartLine>,
) -> Result<(StatusCode, Json<CartItem>)> {
    let item = services::add_to_cart(&state, &user_id, line).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// # Errors
///
/// Returns 400 for a quantity below 1 and 404 if the line is not the user's.
#[instrument(skip(state))]
pub async fn set_quantity(
    State(state): State<AppState>,
    ApiPath((user_id, item_id)): ApiPath<(UserId, CartItemId)>,
    ApiJson(body): ApiJson<SetCartQuantity>,
) -> Result<Json<CartItem>> {
    let item = services::set_quantity(&state, &user_id, item_id, body).await?;
    Ok(Json(item))
}

/// # Errors
///
/// Returns 404 if the line does not exist or is not the user's.
#[instrument(skip(state))]
pub async fn remove_line(
    State(state): State<AppState>,
    ApiPath((user_id, item_id)): ApiPath<(UserId, CartItemId)>,
) -> Result<Json<Value>> {
    state.store().remove_cart_line(&user_id, item_id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// Empty the user's cart.
///
/// # Errors
///
/// Returns 500 if the store cannot be written.
#[instrument(skip(state))]
pub async fn clear_cart(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<Value>> {
    let deleted = state.store().clear_cart(&user_id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
