//! Bookshelf Client - consumer side of the Bookshelf API.
//!
//! - [`ApiClient`] - typed wrapper over every REST route
//! - [`BookCache`] - catalog cache validated against `booksVersion`, with an
//!   optional on-disk snapshot
//! - [`CartService`] - optimistic cart whose mutations are confirmed or rolled
//!   back by the server
//! - [`Observable`] / [`Notices`] - change subscriptions and user-facing
//!   messages
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let api = ApiClient::new(&config)?;
//! let books = BookCache::new(api.clone(), config.snapshot_path.clone());
//! let cart = CartService::new(api, UserId::new("u1"), Notices::new());
//!
//! cart.hydrate(&books).await?;
//! if let Some(book) = books.load_books(false).await?.first() {
//!     cart.add_to_cart(book).await;
//! }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cache;
pub mod cart;
pub mod config;
pub mod error;
pub mod observable;

pub use api::ApiClient;
pub use cache::{BookCache, CatalogSnapshot};
pub use cart::{CartEntry, CartService, CartState, Mutation, MutationKind, MutationState};
pub use config::ClientConfig;
pub use error::ClientError;
pub use observable::{Notice, NoticeLevel, Notices, Observable};
