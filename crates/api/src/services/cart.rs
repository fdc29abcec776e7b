//! Cart mutations that need more than a single store call.

use bookshelf_core::{AddCartLine, CartItem, CartItemId, SetCartQuantity, UserId};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::store::StoreError;
use crate::version;

/// Error message for a stock violation; clients match on it.
pub const OUT_OF_STOCK: &str = "out_of_stock";

/// Add `line` to a user's cart.
///
/// The quantity defaults to 1 and accumulates onto an existing line for the
/// same book. Out-of-stock books are rejected unless the user is an admin.
/// The stock check is not a reservation: a book can go out of stock between
/// this check and the write.
///
/// # Errors
///
/// - `BadRequest` if `bookId` is missing or the quantity is not positive
/// - `NotFound` if the book does not exist
/// - `Conflict` (`out_of_stock`) if the book is flagged out of stock
pub async fn add_to_cart(state: &AppState, user_id: &UserId, line: AddCartLine) -> Result<CartItem> {
    let book_id = line
        .book_id
        .filter(|id| !id.is_blank())
        .ok_or_else(|| AppError::BadRequest("bookId required".to_string()))?;
    let quantity = positive_quantity(line.quantity.unwrap_or(1))?;

    let book = match state.store().get_book(&book_id).await {
        Ok(book) => book,
        Err(StoreError::NotFound) => {
            return Err(AppError::NotFound(format!("book {book_id} not found")));
        }
        Err(e) => return Err(e.into()),
    };

    if book.out_of_stock && !is_admin(state, user_id).await? {
        tracing::info!(user_id = %user_id, book_id = %book_id, "rejected out-of-stock add");
        return Err(AppError::Conflict(OUT_OF_STOCK.to_string()));
    }

    let item = state
        .store()
        .add_cart_line(user_id, &book.id, quantity, version::now())
        .await?;
    tracing::debug!(item_id = %item.id, quantity = item.quantity, "cart line saved");
    Ok(item)
}

/// Set the quantity of one of a user's cart lines.
///
/// # Errors
///
/// - `BadRequest` if the quantity is not positive
/// - `NotFound` if the line does not belong to the user
pub async fn set_quantity(
    state: &AppState,
    user_id: &UserId,
    item_id: CartItemId,
    body: SetCartQuantity,
) -> Result<CartItem> {
    let quantity = positive_quantity(body.quantity)?;
    Ok(state
        .store()
        .set_cart_quantity(user_id, item_id, quantity)
        .await?)
}

/// Whether the user's phone is one of the configured admin phones.
///
/// Unknown users are not admins.
async fn is_admin(state: &AppState, user_id: &UserId) -> Result<bool> {
    match state.store().get_user(user_id).await {
        Ok(user) => Ok(state.config().is_admin_phone(&user.phone)),
        Err(StoreError::NotFound) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn positive_quantity(quantity: i64) -> Result<u32> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| AppError::BadRequest("quantity must be a positive integer".to_string()))
}
