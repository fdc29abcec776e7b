//! OTP service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `OTP_HOST` - Bind address (default: 127.0.0.1)
//! - `OTP_PORT` - Listen port (default: 5001)
//! - `OTP_TTL_SECS` - Lifetime of an issued code in seconds (default: 300)

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// OTP service configuration.
#[derive(Debug, Clone)]
pub struct OtpConfig {
    pub host: IpAddr,
    pub port: u16,
    /// How long a code stays valid after it is sent
    pub ttl: Duration,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5001,
            ttl: Duration::from_secs(300),
        }
    }
}

impl OtpConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let host = parse_env("OTP_HOST")?.unwrap_or(defaults.host);
        let port = parse_env("OTP_PORT")?.unwrap_or(defaults.port);
        let ttl = parse_env::<u64>("OTP_TTL_SECS")?
            .map_or(defaults.ttl, Duration::from_secs);

        Ok(Self { host, port, ttl })
    }

    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// TTL in whole seconds, as reported to clients.
    #[must_use]
    pub const fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }
}

/// Parse an optional environment variable.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OtpConfig::default();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:5001");
        assert_eq!(config.ttl_secs(), 300);
    }
}
