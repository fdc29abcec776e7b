//! Core types for Bookshelf.
//!
//! This module provides type-safe wrappers for the store's domain concepts.

pub mod book;
pub mod cart;
pub mod document;
pub mod id;
pub mod order;
pub mod price;
pub mod user;

pub use book::{Book, BookPatch, BooksVersion, Category, CategoryFilter, CategoryFilterError};
pub use cart::{AddCartLine, CartItem, SetCartQuantity};
pub use document::{CartDocument, Document, StoredCartLine};
pub use id::*;
pub use order::{NewOrder, NewOrderError, Order, OrderItem, sort_newest_first};
pub use price::{Price, PriceError};
pub use user::{User, UserDraft, UserFilter, UserPatch, UserPatchError};
