//! Business logic services for the API.
//!
//! # Services
//!
//! - `cart` - Cart line validation and out-of-stock enforcement
//! - `orders` - Turning a cart into an immutable order record

pub mod cart;
pub mod orders;

pub use cart::{add_to_cart, set_quantity};
pub use orders::place_order;
