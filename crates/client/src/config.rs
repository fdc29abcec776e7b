//! Client configuration.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `BOOKSHELF_API_URL` - Base URL of the API (default: <http://127.0.0.1:8080/>)
//! - `BOOKSHELF_CLIENT_TIMEOUT_SECS` - Request timeout in seconds (default: 10)
//! - `BOOKSHELF_CACHE_PATH` - File for the persistent catalog snapshot (default: none)

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ClientError;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the API lives and how the client talks to it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Always ends with `/` so endpoint paths append cleanly
    pub base_url: Url,
    pub timeout: Duration,
    /// Catalog snapshot surviving restarts; in-memory only when `None`
    pub snapshot_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Configuration for an API at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Url` if `base_url` is not an absolute URL that
    /// can carry a path.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(Self {
            base_url: url,
            timeout: DEFAULT_TIMEOUT,
            snapshot_path: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Url` if `BOOKSHELF_API_URL` is malformed.
    pub fn from_env() -> Result<Self, ClientError> {
        let base = std::env::var("BOOKSHELF_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
        let mut config = Self::new(&base)?;

        if let Some(secs) = std::env::var("BOOKSHELF_CLIENT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config.snapshot_path = std::env::var("BOOKSHELF_CACHE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    #[must_use]
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
