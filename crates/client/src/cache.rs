//! Version-checked catalog cache.
//!
//! The catalog is kept in memory and, when a snapshot path is configured, in
//! a JSON file that survives restarts. A cached catalog is only trusted when
//! its recorded `booksVersion` is positive and equal to the server's current
//! one. Version 0 means "unknown" and always forces a refetch.
//!
//! The version is read before the books. A mutation landing between the two
//! reads leaves the cache labelled with the older version, so the next load
//! refetches instead of trusting stale data.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use bookshelf_core::{Book, BookId};

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::observable::Observable;

/// A catalog together with the version it was fetched under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub books_version: i64,
    pub books: Vec<Book>,
}

impl CatalogSnapshot {
    /// Whether this snapshot may stand in for the server's catalog.
    #[must_use]
    pub const fn is_fresh(&self, server_version: i64) -> bool {
        self.books_version > 0 && self.books_version == server_version
    }
}

/// Catalog cache in front of an [`ApiClient`].
#[derive(Debug)]
pub struct BookCache {
    api: ApiClient,
    snapshot_path: Option<PathBuf>,
    current: Observable<Option<CatalogSnapshot>>,
    // Serialises loads so concurrent callers share one fetch.
    loading: Mutex<()>,
}

impl BookCache {
    #[must_use]
    pub fn new(api: ApiClient, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            api,
            snapshot_path,
            current: Observable::default(),
            loading: Mutex::new(()),
        }
    }

    /// The catalog, from cache when it is provably current.
    ///
    /// With `force` the server is always asked for the full list.
    ///
    /// # Errors
    ///
    /// Returns error if the books have to be fetched and the request fails.
    /// The cache is left untouched in that case.
    #[instrument(skip(self))]
    pub async fn load_books(&self, force: bool) -> Result<Vec<Book>, ClientError> {
        let _guard = self.loading.lock().await;
        let server_version = self.server_version().await;

        if !force {
            let cached = match self.current.get() {
                Some(snapshot) => Some(snapshot),
                None => self.read_snapshot().await,
            };
            if let Some(snapshot) = cached {
                if snapshot.is_fresh(server_version) {
                    debug!(version = server_version, "Catalog cache is current");
                    let books = snapshot.books.clone();
                    self.current.set(Some(snapshot));
                    return Ok(books);
                }
                debug!(
                    cached = snapshot.books_version,
                    server = server_version,
                    "Catalog cache is stale"
                );
            }
        }

        let books = self.api.books(&[]).await?;
        let snapshot = CatalogSnapshot {
            books_version: server_version,
            books,
        };
        self.write_snapshot(&snapshot).await;
        info!(
            count = snapshot.books.len(),
            version = server_version,
            "Catalog refreshed"
        );

        let books = snapshot.books.clone();
        self.current.set(Some(snapshot));
        Ok(books)
    }

    /// Refetch regardless of cache state.
    ///
    /// # Errors
    ///
    /// Returns error if the books cannot be fetched.
    pub async fn refresh_from_server(&self) -> Result<Vec<Book>, ClientError> {
        self.load_books(true).await
    }

    /// Drop the in-memory catalog and the snapshot file.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the snapshot exists but cannot be removed.
    pub async fn invalidate_cache(&self) -> Result<(), ClientError> {
        let _guard = self.loading.lock().await;
        self.current.set(None);
        if let Some(path) = &self.snapshot_path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!(path = %path.display(), "Catalog snapshot removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Books held in memory, without contacting the server.
    #[must_use]
    pub fn cached_books(&self) -> Vec<Book> {
        self.current
            .with(|current| current.as_ref().map(|s| s.books.clone()))
            .unwrap_or_default()
    }

    /// Version the in-memory catalog was fetched under.
    #[must_use]
    pub fn cached_version(&self) -> Option<i64> {
        self.current.with(|current| current.as_ref().map(|s| s.books_version))
    }

    #[must_use]
    pub fn find(&self, id: &BookId) -> Option<Book> {
        self.current.with(|current| {
            current
                .as_ref()
                .and_then(|s| s.books.iter().find(|b| &b.id == id).cloned())
        })
    }

    /// Watch the catalog; `None` until the first load.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<CatalogSnapshot>> {
        self.current.subscribe()
    }

    /// Server version, or 0 when it cannot be read.
    async fn server_version(&self) -> i64 {
        match self.api.books_version().await {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "Could not read books version");
                0
            }
        }
    }

    async fn read_snapshot(&self) -> Option<CatalogSnapshot> {
        let path = self.snapshot_path.as_ref()?;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read catalog snapshot");
                return None;
            }
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt catalog snapshot");
            })
            .ok()
    }

    async fn write_snapshot(&self, snapshot: &CatalogSnapshot) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let result = match serde_json::to_vec(snapshot) {
            Ok(bytes) => tokio::fs::write(path, bytes).await,
            Err(e) => Err(std::io::Error::other(e)),
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Could not write catalog snapshot");
        }
    }
}
