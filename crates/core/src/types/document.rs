//! The flat JSON document used by the file-backed store.
//!
//! The whole database is one JSON object holding every collection plus the
//! books version. Mutations here are pure; reading and writing the file is
//! the store's concern.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::book::{Book, Category};
use super::cart::CartItem;
use super::id::{BookId, CartItemId, CategoryId, UserId};
use super::order::Order;
use super::user::User;

/// Root object of `db.json`.
///
/// Top-level keys this type does not model are carried in `extra` so a
/// rewrite never drops data it did not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub books_data: Vec<Book>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub carts: Vec<CartDocument>,
    #[serde(default)]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub books_version: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The stored cart of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDocument {
    pub user_id: UserId,
    #[serde(default)]
    pub items: Vec<StoredCartLine>,
}

/// A cart line as kept inside a [`CartDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCartLine {
    #[serde(deserialize_with = "line_id")]
    pub id: CartItemId,
    pub book_id: BookId,
    #[serde(default)]
    pub quantity: u32,
    #[serde(default, alias = "added_at")]
    pub added_at: DateTime<Utc>,
}

impl StoredCartLine {
    #[must_use]
    pub fn to_item(&self, user_id: &UserId) -> CartItem {
        CartItem {
            id: self.id,
            user_id: user_id.clone(),
            book_id: self.book_id.clone(),
            quantity: self.quantity,
            added_at: self.added_at,
        }
    }
}

/// Line ids are integers, but older documents wrote them as `"ci-<millis>"`.
fn line_id<'de, D>(deserializer: D) -> Result<CartItemId, D::Error>
where
    D: Deserializer<'de>,
{
    struct LineId;

    impl Visitor<'_> for LineId {
        type Value = CartItemId;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("an integer or a \"ci-<n>\" string")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(CartItemId::new(value))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            i64::try_from(value)
                .map(CartItemId::new)
                .map_err(|_| E::custom(format!("cart line id {value} out of range")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            value
                .strip_prefix("ci-")
                .unwrap_or(value)
                .parse()
                .map_err(|_| E::custom(format!("invalid cart line id: {value:?}")))
        }
    }

    deserializer.deserialize_any(LineId)
}

impl Document {
    #[must_use]
    pub fn book(&self, id: &BookId) -> Option<&Book> {
        self.books_data.iter().find(|b| &b.id == id)
    }

    pub fn book_mut(&mut self, id: &BookId) -> Option<&mut Book> {
        self.books_data.iter_mut().find(|b| &b.id == id)
    }

    #[must_use]
    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    pub fn user_mut(&mut self, id: &UserId) -> Option<&mut User> {
        self.users.iter_mut().find(|u| &u.id == id)
    }

    /// The cart lines of a user, in insertion order.
    #[must_use]
    pub fn cart_items(&self, user_id: &UserId) -> Vec<CartItem> {
        self.carts
            .iter()
            .find(|c| &c.user_id == user_id)
            .map(|c| c.items.iter().map(|line| line.to_item(user_id)).collect())
            .unwrap_or_default()
    }

    fn cart_mut(&mut self, user_id: &UserId) -> Option<&mut CartDocument> {
        self.carts.iter_mut().find(|c| &c.user_id == user_id)
    }

    fn next_line_id(&self) -> CartItemId {
        let max = self
            .carts
            .iter()
            .flat_map(|c| c.items.iter())
            .map(|line| line.id.as_i64())
            .max()
            .unwrap_or(0);
        CartItemId::new(max.saturating_add(1))
    }

    /// Add `quantity` of a book to a user's cart.
    ///
    /// An existing line for the same book has its quantity increased and its
    /// timestamp refreshed; otherwise a new line is appended.
    pub fn add_to_cart(
        &mut self,
        user_id: &UserId,
        book_id: &BookId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> CartItem {
        let next_id = self.next_line_id();
        let cart = match self.carts.iter().position(|c| &c.user_id == user_id) {
            Some(idx) => &mut self.carts[idx],
            None => {
                self.carts.push(CartDocument {
                    user_id: user_id.clone(),
                    items: Vec::new(),
                });
                let last = self.carts.len() - 1;
                &mut self.carts[last]
            }
        };

        if let Some(line) = cart.items.iter_mut().find(|l| &l.book_id == book_id) {
            line.quantity = line.quantity.saturating_add(quantity);
            line.added_at = now;
            return line.to_item(user_id);
        }

        let line = StoredCartLine {
            id: next_id,
            book_id: book_id.clone(),
            quantity,
            added_at: now,
        };
        let item = line.to_item(user_id);
        cart.items.push(line);
        item
    }

    /// Set the quantity of an existing line. Returns `None` if the user has no
    /// such line.
    pub fn set_cart_quantity(
        &mut self,
        user_id: &UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Option<CartItem> {
        let line = self
            .cart_mut(user_id)?
            .items
            .iter_mut()
            .find(|l| l.id == item_id)?;
        line.quantity = quantity;
        Some(line.to_item(user_id))
    }

    /// Remove a line. Returns `false` if the user has no such line.
    pub fn remove_cart_line(&mut self, user_id: &UserId, item_id: CartItemId) -> bool {
        let Some(cart) = self.cart_mut(user_id) else {
            return false;
        };
        let before = cart.items.len();
        cart.items.retain(|l| l.id != item_id);
        cart.items.len() != before
    }

    /// Remove every line of a user's cart, returning how many were removed.
    pub fn clear_cart(&mut self, user_id: &UserId) -> usize {
        self.cart_mut(user_id)
            .map(|cart| core::mem::take(&mut cart.items).len())
            .unwrap_or_default()
    }

    /// Record an order and empty the ordering user's cart.
    pub fn place_order(&mut self, order: Order) {
        self.clear_cart(&order.user_id);
        self.orders.push(order);
    }
}
