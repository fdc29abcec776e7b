//! Orders: the immutable record a cart turns into at checkout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{BookId, OrderId, UserId};
use super::price::Price;
use crate::serde_helpers::lenient_string;

const fn one() -> u32 {
    1
}

/// A line of an order, as snapshotted from the client's cart.
///
/// Prices are taken as supplied and never re-read from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: BookId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default = "one")]
    pub qty: u32,
    #[serde(default)]
    pub price: Price,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderItem {
    #[must_use]
    pub fn new(id: BookId, name: impl Into<String>, qty: u32, price: Price) -> Self {
        Self {
            id,
            name: name.into(),
            qty,
            price,
            extra: Map::new(),
        }
    }

    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.qty)
    }
}

/// Reasons a `POST /orders` body is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NewOrderError {
    #[error("userId required")]
    MissingUser,
    #[error("items required")]
    NoItems,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default)]
    pub total: Price,
}

impl NewOrder {
    /// The trimmed user id, once the body is known to be placeable.
    ///
    /// # Errors
    ///
    /// Returns `NewOrderError` when the user id is blank or there are no items.
    pub fn validate(&self) -> Result<UserId, NewOrderError> {
        let user_id = self
            .user_id
            .as_ref()
            .map(|id| id.as_str().trim())
            .filter(|id| !id.is_empty())
            .ok_or(NewOrderError::MissingUser)?;

        if self.items.is_empty() {
            return Err(NewOrderError::NoItems);
        }

        Ok(UserId::new(user_id))
    }
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "orderId", alias = "id")]
    pub id: OrderId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ack: String,
    pub user_id: UserId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub total: Price,
    #[serde(alias = "created_at")]
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build the order record for a validated request.
    #[must_use]
    pub fn place(
        id: OrderId,
        ack: String,
        user_id: UserId,
        request: NewOrder,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            ack,
            user_id,
            phone: request.phone,
            address: request.address,
            items: request.items,
            total: request.total,
            created_at,
        }
    }
}

/// Sort orders by creation time, newest first.
///
/// Orders created in the same millisecond fall back to descending id, which
/// follows creation order for generated ids.
pub fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
