//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `BOOKSHELF_HOST` - Bind address (default: 127.0.0.1)
//! - `BOOKSHELF_PORT` - Listen port, falling back to `PORT` (default: 8080)
//! - `BOOKSHELF_DATA_DIR` - Directory holding `db.json` / `db.sqlite` (default: data)
//! - `BOOKSHELF_STORE` - Storage engine: `auto`, `json` or `sqlite` (default: auto)
//! - `BOOKSHELF_ADMIN_PHONES` - Comma-separated phones that bypass stock checks
//!   (default: 8793895938)
//! - `BOOKSHELF_CORS_ORIGIN` - Single allowed origin (default: any origin)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

const JSON_FILE: &str = "db.json";
const SQLITE_FILE: &str = "db.sqlite";
const DEFAULT_ADMIN_PHONES: &str = "8793895938";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which storage engine to open at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Use `SQLite` if `db.sqlite` exists, the JSON document otherwise.
    #[default]
    Auto,
    Json,
    /// Use `SQLite`, creating the database file if needed.
    Sqlite,
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(format!("expected auto, json or sqlite, got {other:?}")),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory holding the data files
    pub data_dir: PathBuf,
    pub store_mode: StoreMode,
    /// Users with one of these phones may add out-of-stock books to their cart
    pub admin_phones: Vec<String>,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("BOOKSHELF_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("BOOKSHELF_HOST".to_string(), e.to_string())
            })?;
        let port = get_optional_env("BOOKSHELF_PORT")
            .or_else(|| get_optional_env("PORT"))
            .unwrap_or_else(|| "8080".to_string())
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("BOOKSHELF_PORT".to_string(), e.to_string())
            })?;
        let data_dir = PathBuf::from(get_env_or_default("BOOKSHELF_DATA_DIR", "data"));
        let store_mode = get_env_or_default("BOOKSHELF_STORE", "auto")
            .parse::<StoreMode>()
            .map_err(|e| ConfigError::InvalidEnvVar("BOOKSHELF_STORE".to_string(), e))?;
        let admin_phones =
            parse_phone_list(&get_env_or_default("BOOKSHELF_ADMIN_PHONES", DEFAULT_ADMIN_PHONES));

        Ok(Self {
            host,
            port,
            data_dir,
            store_mode,
            admin_phones,
            cors_origin: get_optional_env("BOOKSHELF_CORS_ORIGIN"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Configuration for a store rooted at `data_dir`, as used by tests and
    /// embedders. Binds to an ephemeral local port.
    #[must_use]
    pub fn for_data_dir(data_dir: impl Into<PathBuf>, store_mode: StoreMode) -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 0,
            data_dir: data_dir.into(),
            store_mode,
            admin_phones: parse_phone_list(DEFAULT_ADMIN_PHONES),
            cors_origin: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Path of the flat JSON document.
    #[must_use]
    pub fn json_path(&self) -> PathBuf {
        self.data_dir.join(JSON_FILE)
    }

    /// Path of the `SQLite` database file.
    #[must_use]
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join(SQLITE_FILE)
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether `phone` belongs to an admin.
    #[must_use]
    pub fn is_admin_phone(&self, phone: &str) -> bool {
        let phone = phone.trim();
        !phone.is_empty() && self.admin_phones.iter().any(|p| p == phone)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_phone_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_store_mode_parse() {
        assert_eq!("auto".parse::<StoreMode>().unwrap(), StoreMode::Auto);
        assert_eq!(" SQLite ".parse::<StoreMode>().unwrap(), StoreMode::Sqlite);
        assert_eq!("json".parse::<StoreMode>().unwrap(), StoreMode::Json);
        assert!("postgres".parse::<StoreMode>().is_err());
    }

    #[test]
    fn test_phone_list() {
        assert_eq!(parse_phone_list(" 1, ,2 "), vec!["1", "2"]);
        assert!(parse_phone_list("").is_empty());
    }

    #[test]
    fn test_paths_and_admin() {
        let config = ApiConfig::for_data_dir("/tmp/shelf", StoreMode::Json);
        assert_eq!(config.json_path(), PathBuf::from("/tmp/shelf/db.json"));
        assert_eq!(config.sqlite_path(), PathBuf::from("/tmp/shelf/db.sqlite"));
        assert!(config.is_admin_phone("8793895938"));
        assert!(!config.is_admin_phone(""));
        assert!(!config.is_admin_phone("1234"));
    }

    #[test]
    fn test_socket_addr() {
        let mut config = ApiConfig::for_data_dir("data", StoreMode::Auto);
        config.port = 8080;
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }
}
