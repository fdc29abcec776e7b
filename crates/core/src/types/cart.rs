//! Cart lines and the request bodies that mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{BookId, CartItemId, UserId};

/// One (user, book) quantity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

/// Body of `POST /cart/:userId`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<BookId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
}

impl AddCartLine {
    #[must_use]
    pub fn new(book_id: BookId, quantity: u32) -> Self {
        Self {
            book_id: Some(book_id),
            quantity: Some(i64::from(quantity)),
        }
    }
}

/// Body of `PATCH /cart/:userId/:itemId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCartQuantity {
    pub quantity: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_cart_item_wire_shape() {
        let item = CartItem {
            id: CartItemId::new(5),
            user_id: UserId::new("u1"),
            book_id: BookId::new("b1"),
            quantity: 2,
            added_at: "2024-05-01T10:00:00.250Z".parse().unwrap(),
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 5,
                "userId": "u1",
                "bookId": "b1",
                "quantity": 2,
                "addedAt": "2024-05-01T10:00:00.250Z"
            })
        );
    }

    #[test]
    fn test_add_line_accepts_numeric_book_id() {
        let line: AddCartLine = serde_json::from_value(json!({"bookId": 12})).unwrap();
        assert_eq!(line.book_id, Some(BookId::new("12")));
        assert_eq!(line.quantity, None);
    }
}
