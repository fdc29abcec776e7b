//! Bookshelf Core - Shared types library.
//!
//! This crate provides the domain types used across all Bookshelf components:
//! - `api` - REST backend over the JSON document or `SQLite` store
//! - `client` - Catalog cache and optimistic cart for API consumers
//! - `integration-tests` - End-to-end tests
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. Both storage engines serialize through these types,
//! which is what keeps their JSON shapes identical.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, prices, catalog, users, carts, orders, and the
//!   flat JSON document layout
//! - [`serde_helpers`] - Lenient deserializers for loosely typed stored data

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod serde_helpers;
pub mod types;

pub use types::*;
