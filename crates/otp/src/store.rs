//! In-memory pending codes, one per phone.
//!
//! Expiry is checked when a code is verified; nothing sweeps old entries.
//! Everything is lost on restart.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

use crate::error::OtpError;

#[derive(Debug, Clone)]
struct PendingCode {
    code: String,
    expires_at: Instant,
}

/// Pending codes keyed by phone.
#[derive(Debug)]
pub struct OtpStore {
    codes: DashMap<String, PendingCode>,
    ttl: Duration,
}

impl OtpStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
        }
    }

    /// Issue a fresh six-digit code, replacing any pending one.
    pub fn issue(&self, phone: &str) -> String {
        self.issue_at(phone, Instant::now())
    }

    /// Check `code` and consume it on success.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no code is pending for the phone
    /// - `Expired` if the code outlived its TTL (it is discarded)
    /// - `Invalid` if the code does not match (it stays pending)
    pub fn verify(&self, phone: &str, code: &str) -> Result<(), OtpError> {
        self.verify_at(phone, code, Instant::now())
    }

    fn issue_at(&self, phone: &str, now: Instant) -> String {
        let code = generate_code();
        self.codes.insert(
            phone.to_string(),
            PendingCode {
                code: code.clone(),
                expires_at: now + self.ttl,
            },
        );
        code
    }

    fn verify_at(&self, phone: &str, code: &str, now: Instant) -> Result<(), OtpError> {
        let pending = self
            .codes
            .get(phone)
            .map(|entry| entry.value().clone())
            .ok_or(OtpError::NotFound)?;

        if now > pending.expires_at {
            self.codes.remove(phone);
            return Err(OtpError::Expired);
        }
        if pending.code != code {
            return Err(OtpError::Invalid);
        }

        self.codes.remove(phone);
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.codes.len()
    }
}

/// Six random digits, never starting with 0.
fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000_u32).to_string()
}

/// Hide all but the last four characters of `phone` behind `*`.
#[must_use]
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    let hidden = chars.len().saturating_sub(4);
    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < hidden { '*' } else { *c })
        .collect()
}
