//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::store::{self, Store, StoreError};

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; holds the configuration and the store engine
/// chosen at start-up.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    store: Arc<dyn Store>,
}

impl AppState {
    /// Create state around an already opened store.
    #[must_use]
    pub fn new(config: ApiConfig, store: Arc<dyn Store>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, store }),
        }
    }

    /// Open the store selected by `config` and build the state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the data directory or database cannot be prepared.
    pub async fn open(config: ApiConfig) -> Result<Self, StoreError> {
        let store = store::open(&config).await?;
        Ok(Self::new(config, store))
    }

    /// Get a reference to the API configuration.
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get the active store engine.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }
}
