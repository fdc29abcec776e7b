//! Persistence for the catalog, users, carts and orders.
//!
//! # Engines
//!
//! - [`JsonStore`] - one flat JSON document (`db.json`), rewritten on every
//!   mutation. Concurrent writers race; the last write wins.
//! - [`SqliteStore`] - relational tables in `db.sqlite`.
//!
//! Both implement [`Store`] and return identical JSON shapes. The engine is
//! chosen once at start-up by [`open`].

pub mod json;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

use bookshelf_core::{
    Book, BookId, BookPatch, CartItem, CartItemId, Category, CategoryFilter, CategoryId, Order,
    OrderId, User, UserFilter, UserId, UserPatch,
};

use crate::config::{ApiConfig, StoreMode};

pub use json::JsonStore;
pub use sqlite::SqliteStore;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// The request conflicts with stored data (e.g. duplicate id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The supplied fields cannot be applied to the stored record.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Reading or writing the data file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON document could not be parsed or serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Which engine backs a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Json,
    Sqlite,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        })
    }
}

/// Uniform CRUD and query surface over both storage engines.
#[async_trait]
pub trait Store: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Check that the backing file or database is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    // Books

    /// All books whose categories intersect `filter`, or every book.
    async fn list_books(&self, filter: Option<&CategoryFilter>) -> Result<Vec<Book>, StoreError>;

    async fn get_book(&self, id: &BookId) -> Result<Book, StoreError>;

    /// Apply a non-empty patch and bump the books version in the same write.
    async fn update_book(&self, id: &BookId, patch: &BookPatch) -> Result<Book, StoreError>;

    /// Current books version, 0 when never set.
    async fn books_version(&self) -> Result<i64, StoreError>;

    // Categories

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn get_category(&self, id: CategoryId) -> Result<Category, StoreError>;

    // Users

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError>;

    /// Insert a user. Fails with `Conflict` if the id is taken.
    async fn create_user(&self, user: User) -> Result<User, StoreError>;

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<User, StoreError>;

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError>;

    /// Shallow-merge `patch` into the user's settings and return the result.
    async fn merge_user_settings(
        &self,
        id: &UserId,
        patch: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError>;

    // Cart

    async fn list_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, StoreError>;

    /// Insert a line or add to the quantity of the existing one.
    async fn add_cart_line(
        &self,
        user_id: &UserId,
        book_id: &BookId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartItem, StoreError>;

    async fn set_cart_quantity(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, StoreError>;

    /// Delete a line. `NotFound` unless it belongs to `user_id`.
    async fn remove_cart_line(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
    ) -> Result<(), StoreError>;

    /// Delete every line of a user's cart and return how many were removed.
    async fn clear_cart(&self, user_id: &UserId) -> Result<usize, StoreError>;

    // Orders

    /// Persist an order and clear its user's cart as one write.
    async fn place_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Orders of a user, newest first.
    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError>;

    async fn get_order(&self, id: &OrderId) -> Result<Order, StoreError>;
}

/// Open the engine selected by `config`.
///
/// In [`StoreMode::Auto`] the `SQLite` file is used when it exists and the
/// JSON document otherwise.
///
/// # Errors
///
/// Returns `StoreError` if the data directory or database cannot be prepared.
pub async fn open(config: &ApiConfig) -> Result<Arc<dyn Store>, StoreError> {
    let use_sqlite = match config.store_mode {
        StoreMode::Json => false,
        StoreMode::Sqlite => true,
        StoreMode::Auto => tokio::fs::try_exists(config.sqlite_path()).await?,
    };

    if use_sqlite {
        let store = SqliteStore::open(&config.sqlite_path()).await?;
        store.backfill_from_json(&config.json_path()).await?;
        tracing::info!(path = %config.sqlite_path().display(), "using sqlite store");
        Ok(Arc::new(store))
    } else {
        let store = JsonStore::open(config.json_path()).await?;
        tracing::info!(path = %config.json_path().display(), "using json store");
        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod contract;
