//! Catalog handlers.

use axum::{
    Json, Router,
    extract::State,
    routing::get,
};
use serde::Deserialize;
use tracing::instrument;

use bookshelf_core::{Book, BookId, BookPatch, BooksVersion, CategoryFilter};

use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

/// Build the books router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/booksData", get(list_books))
        .route("/booksData/{id}", get(get_book).patch(update_book))
        .route("/booksVersion", get(books_version))
}

/// Query for `GET /booksData`.
#[derive(Debug, Default, Deserialize)]
pub struct BooksQuery {
    /// Comma-separated category ids; a book matches if it has any of them.
    pub category: Option<String>,
}

/// List books, optionally restricted to some categories.
///
/// # Errors
///
/// Returns 400 if a category id is not an integer.
#[instrument(skip(state))]
pub async fn list_books(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<BooksQuery>,
) -> Result<Json<Vec<Book>>> {
    let filter = query
        .category
        .as_deref()
        .map(CategoryFilter::parse)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?
        .flatten();

    Ok(Json(state.store().list_books(filter.as_ref()).await?))
}

/// # Errors
///
/// Returns 404 if the book does not exist.
#[instrument(skip(state))]
pub async fn get_book(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<BookId>,
) -> Result<Json<Book>> {
    Ok(Json(state.store().get_book(&id).await?))
}

/// Apply a partial update and bump the books version.
///
/// # Errors
///
/// Returns 400 if no recognised field is present and 404 if the book does
/// not exist.
#[instrument(skip(state, patch))]
pub async fn update_book(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<BookId>,
    ApiJson(patch): ApiJson<BookPatch>,
) -> Result<Json<Book>> {
    let book = state.store().update_book(&id, &patch).await?;
    tracing::info!(
        book_id = %book.id,
        out_of_stock = book.out_of_stock,
        "book updated"
    );
    Ok(Json(book))
}

/// Current books version.
///
/// # Errors
///
/// Returns 500 if the store cannot be read.
#[instrument(skip(state))]
pub async fn books_version(State(state): State<AppState>) -> Result<Json<BooksVersion>> {
    Ok(Json(BooksVersion {
        books_version: state.store().books_version().await?,
    }))
}
