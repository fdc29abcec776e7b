//! Order placement.
//!
//! Items and total are stored exactly as the client sent them. Nothing is
//! re-priced or re-checked against the catalog, so a book that went out of
//! stock after it was added to the cart can still be ordered.

use rand::Rng;

use bookshelf_core::{NewOrder, Order, OrderId};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::version;

/// Place an order and clear the user's cart in the same write.
///
/// # Errors
///
/// - `BadRequest` if `userId` is blank or `items` is empty
/// - `Store` if the order cannot be persisted
pub async fn place_order(state: &AppState, request: NewOrder) -> Result<Order> {
    let user_id = request
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let order = Order::place(
        new_order_id(),
        new_ack_code(),
        user_id,
        request,
        version::now(),
    );
    state.store().place_order(&order).await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %order.user_id,
        items = order.items.len(),
        total = %order.total,
        "order placed"
    );
    Ok(order)
}

/// `ORD` followed by a process-unique millisecond tick.
fn new_order_id() -> OrderId {
    OrderId::new(format!("ORD{}", version::unique_millis()))
}

/// `ACK` followed by six random digits. A receipt token, not a secret.
fn new_ack_code() -> String {
    format!("ACK{}", rand::rng().random_range(100_000..1_000_000))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use bookshelf_core::{BookId, OrderItem, UserId};

    use super::*;
    use crate::config::{ApiConfig, StoreMode};
    use crate::store::JsonStore;

    async fn state(dir: &tempfile::TempDir) -> AppState {
        let store = JsonStore::open(dir.path().join("db.json")).await.unwrap();
        AppState::new(
            ApiConfig::for_data_dir(dir.path(), StoreMode::Json),
            Arc::new(store),
        )
    }

    fn request(user: Option<&str>, items: Vec<OrderItem>) -> NewOrder {
        NewOrder {
            user_id: user.map(UserId::new),
            items,
            address: "1 Main St".to_string(),
            phone: "555".to_string(),
            total: "450".parse().unwrap(),
        }
    }

    fn dune() -> OrderItem {
        OrderItem::new(BookId::new("b1"), "Dune", 1, "450".parse().unwrap())
    }

    #[test]
    fn test_ids_have_expected_shape() {
        let id = new_order_id();
        let millis = id.as_str().strip_prefix("ORD").unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_ne!(new_order_id(), new_order_id());

        let ack = new_ack_code();
        let digits = ack.strip_prefix("ACK").unwrap();
        assert_eq!(digits.len(), 6);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_place_order_clears_cart() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;
        let u1 = UserId::new("u1");
        state
            .store()
            .add_cart_line(&u1, &BookId::new("b1"), 1, version::now())
            .await
            .unwrap();

        let order = place_order(&state, request(Some(" u1 "), vec![dune()]))
            .await
            .unwrap();

        assert_eq!(order.user_id, u1);
        assert_eq!(order.items, vec![dune()]);
        assert!(state.store().list_cart(&u1).await.unwrap().is_empty());
        assert_eq!(state.store().list_orders(&u1).await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn test_place_order_requires_user_and_items() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir).await;

        let err = place_order(&state, request(None, vec![dune()])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "userId required"));

        let err = place_order(&state, request(Some("  "), vec![dune()])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = place_order(&state, request(Some("u1"), vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "items required"));
    }
}
