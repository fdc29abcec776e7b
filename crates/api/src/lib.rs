//! Bookshelf API library.
//!
//! The REST backend as a library, so the binary and the integration tests
//! build the same router.
//!
//! # Architecture
//!
//! - [`store`] - One [`store::Store`] trait, two engines: a flat JSON
//!   document and `SQLite`, chosen at start-up
//! - [`version`] - The monotonic books version
//! - [`services`] - Cart rules (stock enforcement) and order placement
//! - [`routes`] - axum handlers and the middleware stack

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod version;

pub use config::{ApiConfig, StoreMode};
pub use routes::app;
pub use state::AppState;
