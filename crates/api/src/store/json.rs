//! Flat JSON document engine.
//!
//! Every call reads `db.json` in full; every mutation rewrites it. Writes go
//! to a temporary file that is renamed over the document, so readers never
//! see a half-written file. There is no locking between requests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use bookshelf_core::{
    Book, BookId, BookPatch, CartItem, CartItemId, Category, CategoryFilter, CategoryId, Document,
    Order, OrderId, User, UserFilter, UserId, UserPatch, sort_newest_first,
};

use super::{Store, StoreError, StoreKind};
use crate::version;

/// Store backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Open the document at `path`, creating it and its directory if missing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory or file cannot be created.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };

        if let Some(dir) = store.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        if !tokio::fs::try_exists(&store.path).await? {
            store.write(&Document::default()).await?;
            tracing::info!(path = %store.path.display(), "created empty json document");
        }

        Ok(store)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the file cannot be read and
    /// `StoreError::Json` if it is not a valid document.
    pub async fn read(&self) -> Result<Document, StoreError> {
        let raw = tokio::fs::read(&self.path).await?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Document::default());
        }
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Replace the document on disk.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the temporary file cannot be written or
    /// renamed into place.
    pub async fn write(&self, document: &Document) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(document)?;
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read the document, apply `change`, and write it back if `change`
    /// succeeded.
    async fn mutate<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Document) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut document = self.read().await?;
        let out = change(&mut document)?;
        self.write(&document).await?;
        Ok(out)
    }
}

#[async_trait]
impl Store for JsonStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Json
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::fs::metadata(&self.path).await?;
        Ok(())
    }

    async fn list_books(&self, filter: Option<&CategoryFilter>) -> Result<Vec<Book>, StoreError> {
        let document = self.read().await?;
        Ok(document
            .books_data
            .into_iter()
            .map(Book::normalized)
            .filter(|b| filter.is_none_or(|f| f.matches(b)))
            .collect())
    }

    async fn get_book(&self, id: &BookId) -> Result<Book, StoreError> {
        let document = self.read().await?;
        document
            .book(id)
            .cloned()
            .map(Book::normalized)
            .ok_or(StoreError::NotFound)
    }

    async fn update_book(&self, id: &BookId, patch: &BookPatch) -> Result<Book, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::Invalid("no valid fields".to_string()));
        }

        self.mutate(|document| {
            let book = document.book_mut(id).ok_or(StoreError::NotFound)?;
            book.apply(patch);
            let updated = book.clone().normalized();
            document.books_version =
                version::next_version(document.books_version.max(0), version::now_millis());
            Ok(updated)
        })
        .await
    }

    async fn books_version(&self) -> Result<i64, StoreError> {
        Ok(self.read().await?.books_version.max(0))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.read().await?.categories)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Category, StoreError> {
        self.read()
            .await?
            .category(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let document = self.read().await?;
        Ok(document
            .users
            .into_iter()
            .filter(|u| filter.matches(u))
            .collect())
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        self.mutate(|document| {
            if document.user(&user.id).is_some() {
                return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
            }
            document.users.push(user.clone());
            Ok(user)
        })
        .await
    }

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<User, StoreError> {
        self.mutate(|document| {
            let user = document.user_mut(id).ok_or(StoreError::NotFound)?;
            let updated = patch
                .apply(user)
                .map_err(|e| StoreError::Invalid(e.to_string()))?;
            *user = updated.clone();
            Ok(updated)
        })
        .await
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        self.read()
            .await?
            .user(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn merge_user_settings(
        &self,
        id: &UserId,
        patch: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError> {
        self.mutate(|document| {
            let user = document.user_mut(id).ok_or(StoreError::NotFound)?;
            user.merge_settings(patch);
            Ok(user.settings.clone())
        })
        .await
    }

    async fn list_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, StoreError> {
        Ok(self.read().await?.cart_items(user_id))
    }

    async fn add_cart_line(
        &self,
        user_id: &UserId,
        book_id: &BookId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartItem, StoreError> {
        self.mutate(|document| Ok(document.add_to_cart(user_id, book_id, quantity, now)))
            .await
    }

    async fn set_cart_quantity(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, StoreError> {
        self.mutate(|document| {
            document
                .set_cart_quantity(user_id, item_id, quantity)
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn remove_cart_line(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
    ) -> Result<(), StoreError> {
        self.mutate(|document| {
            if document.remove_cart_line(user_id, item_id) {
                Ok(())
            } else {
                Err(StoreError::NotFound)
            }
        })
        .await
    }

    async fn clear_cart(&self, user_id: &UserId) -> Result<usize, StoreError> {
        self.mutate(|document| Ok(document.clear_cart(user_id))).await
    }

    async fn place_order(&self, order: &Order) -> Result<(), StoreError> {
        self.mutate(|document| {
            if document.orders.iter().any(|o| o.id == order.id) {
                return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
            }
            document.place_order(order.clone());
            Ok(())
        })
        .await
    }

    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .read()
            .await?
            .orders
            .into_iter()
            .filter(|o| &o.user_id == user_id)
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Order, StoreError> {
        self.read()
            .await?
            .orders
            .into_iter()
            .find(|o| &o.id == id)
            .ok_or(StoreError::NotFound)
    }
}
