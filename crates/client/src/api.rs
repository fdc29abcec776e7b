//! Typed HTTP client for the Bookshelf REST API.
//!
//! Every method maps one route. Non-2xx answers become
//! [`ClientError::Status`] carrying the `error` field of the JSON body.

use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use bookshelf_core::{
    AddCartLine, Book, BookId, BookPatch, BooksVersion, CartItem, CartItemId, Category,
    CategoryId, NewOrder, Order, OrderId, SetCartQuantity, User, UserDraft, UserId,
};

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct ClearedCart {
    deleted: u64,
}

/// Client for one Bookshelf API instance.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// All books, or those in any of `categories`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self))]
    pub async fn books(&self, categories: &[CategoryId]) -> Result<Vec<Book>, ClientError> {
        let mut url = self.endpoint(&["booksData"])?;
        if !categories.is_empty() {
            let list = categories
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            url.query_pairs_mut().append_pair("category", &list);
        }
        let books: Vec<Book> = self.send(self.client.get(url)).await?;
        debug!(count = books.len(), "Fetched books");
        Ok(books)
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the book does not exist.
    #[instrument(skip(self), fields(book_id = %id))]
    pub async fn book(&self, id: &BookId) -> Result<Book, ClientError> {
        let url = self.endpoint(&["booksData", id.as_str()])?;
        self.send(self.client.get(url)).await
    }

    /// Patch a book; the server bumps the catalog version.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self, patch), fields(book_id = %id))]
    pub async fn update_book(&self, id: &BookId, patch: &BookPatch) -> Result<Book, ClientError> {
        let url = self.endpoint(&["booksData", id.as_str()])?;
        self.send(self.client.patch(url).json(patch)).await
    }

    /// Current catalog version.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self))]
    pub async fn books_version(&self) -> Result<i64, ClientError> {
        let url = self.endpoint(&["booksVersion"])?;
        let version: BooksVersion = self.send(self.client.get(url)).await?;
        Ok(version.books_version)
    }

    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, ClientError> {
        let url = self.endpoint(&["categories"])?;
        self.send(self.client.get(url)).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the category does not exist.
    #[instrument(skip(self))]
    pub async fn category(&self, id: CategoryId) -> Result<Category, ClientError> {
        let url = self.endpoint(&["categories", &id.to_string()])?;
        self.send(self.client.get(url)).await
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Users whose fields equal every `(field, value)` pair.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self))]
    pub async fn users(&self, filter: &[(&str, &str)]) -> Result<Vec<User>, ClientError> {
        let mut url = self.endpoint(&["users"])?;
        if !filter.is_empty() {
            url.query_pairs_mut().extend_pairs(filter);
        }
        self.send(self.client.get(url)).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 409 if the id is taken.
    #[instrument(skip(self, draft))]
    pub async fn create_user(&self, draft: &UserDraft) -> Result<User, ClientError> {
        let url = self.endpoint(&["users"])?;
        self.send(self.client.post(url).json(draft)).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the user does not exist.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn user(&self, id: &UserId) -> Result<User, ClientError> {
        let url = self.endpoint(&["users", id.as_str()])?;
        self.send(self.client.get(url)).await
    }

    /// Partially update a user with arbitrary fields.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self, patch), fields(user_id = %id))]
    pub async fn update_user(
        &self,
        id: &UserId,
        patch: &Map<String, Value>,
    ) -> Result<User, ClientError> {
        let url = self.endpoint(&["users", id.as_str()])?;
        self.send(self.client.patch(url).json(patch)).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the user does not exist.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn settings(&self, id: &UserId) -> Result<Map<String, Value>, ClientError> {
        let url = self.endpoint(&["users", id.as_str(), "settings"])?;
        self.send(self.client.get(url)).await
    }

    /// Shallow-merge `patch` into the user's settings.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the user does not exist.
    #[instrument(skip(self, patch), fields(user_id = %id))]
    pub async fn merge_settings(
        &self,
        id: &UserId,
        patch: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ClientError> {
        let url = self.endpoint(&["users", id.as_str(), "settings"])?;
        self.send(self.client.post(url).json(patch)).await
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, ClientError> {
        let url = self.endpoint(&["cart", user_id.as_str()])?;
        self.send(self.client.get(url)).await
    }

    /// Add to the user's cart, merging into an existing line for the book.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Status` with 409 when the book is out of stock.
    #[instrument(skip(self, line), fields(user_id = %user_id))]
    pub async fn add_to_cart(
        &self,
        user_id: &UserId,
        line: &AddCartLine,
    ) -> Result<CartItem, ClientError> {
        let url = self.endpoint(&["cart", user_id.as_str()])?;
        self.send(self.client.post(url).json(line)).await
    }

    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn set_cart_quantity(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, ClientError> {
        let url = self.endpoint(&["cart", user_id.as_str(), &item_id.to_string()])?;
        let body = SetCartQuantity {
            quantity: i64::from(quantity),
        };
        self.send(self.client.patch(url).json(&body)).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the line is already gone.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn remove_cart_line(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
    ) -> Result<(), ClientError> {
        let url = self.endpoint(&["cart", user_id.as_str(), &item_id.to_string()])?;
        let _: Value = self.send(self.client.delete(url)).await?;
        Ok(())
    }

    /// Empty the user's cart, returning how many lines were removed.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear_cart(&self, user_id: &UserId) -> Result<u64, ClientError> {
        let url = self.endpoint(&["cart", user_id.as_str()])?;
        let cleared: ClearedCart = self.send(self.client.delete(url)).await?;
        Ok(cleared.deleted)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Place an order; the server clears the user's cart with it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Status` with 400 if user or items are missing.
    #[instrument(skip(self, order))]
    pub async fn place_order(&self, order: &NewOrder) -> Result<Order, ClientError> {
        let url = self.endpoint(&["orders"])?;
        let placed: Order = self.send(self.client.post(url).json(order)).await?;
        debug!(order_id = %placed.id, "Order placed");
        Ok(placed)
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API refuses it.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn orders_for_user(&self, user_id: &UserId) -> Result<Vec<Order>, ClientError> {
        let url = self.endpoint(&["orders", "user", user_id.as_str()])?;
        self.send(self.client.get(url)).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Status` with 404 if the order does not exist.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn order(&self, id: &OrderId) -> Result<Order, ClientError> {
        let url = self.endpoint(&["orders", id.as_str()])?;
        self.send(self.client.get(url)).await
    }

    // =========================================================================
    // Plumbing
    // =========================================================================

    /// Append percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Turn a non-2xx response into `ClientError::Status`.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text).map_or(text, |body| body.error);
    if status.is_server_error() {
        warn!(status = status.as_u16(), message = %message, "API server error");
    } else {
        debug!(status = status.as_u16(), message = %message, "API refused request");
    }

    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}
