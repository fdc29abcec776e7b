//! Bookshelf OTP - development-only one-time passcodes.
//!
//! Codes live in process memory for a fixed TTL and are written to the log
//! instead of being delivered. There is no rate limiting and nothing
//! survives a restart.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod routes;
pub mod store;

pub use config::OtpConfig;
pub use error::OtpError;
pub use routes::{OtpState, app};
pub use store::OtpStore;
