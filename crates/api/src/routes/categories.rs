//! Category handlers.

use axum::{Json, Router, extract::State, routing::get};
use tracing::instrument;

use bookshelf_core::{Category, CategoryId};

use crate::error::Result;
use crate::extract::ApiPath;
use crate::state::AppState;

/// Build the categories router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/categories/{id}", get(get_category))
}

/// # Errors
///
/// Returns 500 if the store cannot be read.
#[instrument(skip(state))]
pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(state.store().list_categories().await?))
}

/// # Errors
///
/// Returns 404 if the category does not exist.
#[instrument(skip(state))]
pub async fn get_category(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<Json<Category>> {
    Ok(Json(state.store().get_category(id).await?))
}
