//! Integration tests for Bookshelf.
//!
//! Every test starts a real API server on an ephemeral port, backed by a
//! fresh temporary data directory, and talks to it over HTTP. Tests run
//! once per storage engine so both are held to the same contract.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bookshelf-integration-tests
//! ```
//!
//! # Seed Data
//!
//! | Book | Price | Categories | Stock        |
//! |------|-------|------------|--------------|
//! | b1   | 450   | 1, 3       | in stock     |
//! | b2   | 120.5 | 2          | in stock     |
//! | b3   | 300   | 2          | out of stock |
//!
//! Users `u1` (a customer) and `admin` (phone [`ADMIN_PHONE`], bypasses the
//! stock check) are created through `POST /users`.

use std::net::SocketAddr;

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use bookshelf_api::{ApiConfig, AppState, StoreMode};
use bookshelf_client::{ApiClient, ClientConfig};
use bookshelf_core::Document;

/// Both storage engines, in the order tests run them.
pub const ENGINES: [StoreMode; 2] = [StoreMode::Json, StoreMode::Sqlite];

/// Phone listed in the default admin allow-list.
pub const ADMIN_PHONE: &str = "8793895938";

/// Catalog every test server starts with.
#[must_use]
pub fn seed_document() -> Document {
    serde_json::from_value(json!({
        "booksData": [
            {"id": "b1", "name": "Dune", "author": "Frank Herbert", "price": 450,
             "image_url": "/img/dune.jpg", "pdf_url": "/pdf/dune.pdf", "categories": [1, 3]},
            {"id": "b2", "name": "Emma", "author": "Jane Austen", "price": 120.5,
             "image_url": "/img/emma.jpg", "pdf_url": "/pdf/emma.pdf", "categories": [2]},
            {"id": "b3", "name": "Ulysses", "author": "James Joyce", "price": 300,
             "out_of_stock": 1, "categories": [2]},
        ],
        "categories": [
            {"id": 1, "name": "Fiction"},
            {"id": 2, "name": "Classics"},
            {"id": 3, "name": "Science Fiction"},
        ],
        "booksVersion": 1,
    }))
    .expect("seed document is valid")
}

/// A running API server with its own data directory.
pub struct TestServer {
    pub mode: StoreMode,
    pub addr: SocketAddr,
    pub http: Client,
    data_dir: TempDir,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Seed a data directory, start the API on it and create the test users.
    pub async fn start(mode: StoreMode) -> Self {
        let data_dir = tempfile::tempdir().expect("Failed to create data dir");
        let config = ApiConfig::for_data_dir(data_dir.path(), mode);

        let seed = serde_json::to_vec_pretty(&seed_document()).expect("Failed to encode seed");
        std::fs::write(config.json_path(), seed).expect("Failed to write seed document");

        let state = AppState::open(config).await.expect("Failed to open store");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let handle = tokio::spawn(async move {
            axum::serve(listener, bookshelf_api::app(state))
                .await
                .expect("Test server failed");
        });

        let server = Self {
            mode,
            addr,
            http: Client::new(),
            data_dir,
            handle,
        };
        server.create_user(json!({"id": "u1", "name": "Ana", "phone": "5550001"})).await;
        server
            .create_user(json!({"id": "admin", "name": "Admin", "phone": ADMIN_PHONE}))
            .await;
        server
    }

    async fn create_user(&self, body: Value) {
        let (status, _) = self.post("/users", &body).await;
        assert_eq!(status, StatusCode::CREATED, "seeding user {body}");
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    #[must_use]
    pub fn data_dir(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// A typed client for this server.
    #[must_use]
    pub fn client(&self) -> ApiClient {
        let config = ClientConfig::new(&self.url("/")).expect("Server URL is valid");
        ApiClient::new(&config).expect("Failed to build API client")
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        read(self.http.get(self.url(path))).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        read(self.http.post(self.url(path)).json(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        read(self.http.patch(self.url(path)).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        read(self.http.delete(self.url(path))).await
    }

    /// Current `booksVersion`.
    pub async fn books_version(&self) -> i64 {
        let (status, body) = self.get("/booksVersion").await;
        assert_eq!(status, StatusCode::OK);
        body["booksVersion"].as_i64().expect("booksVersion is a number")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Send a request and decode the body as JSON (`null` when empty).
async fn read(request: reqwest::RequestBuilder) -> (StatusCode, Value) {
    let response = request.send().await.expect("Request failed");
    let status = response.status();
    let bytes = response.bytes().await.expect("Failed to read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

/// Ids of the books in a `/booksData` response, in order.
#[must_use]
pub fn book_ids(books: &Value) -> Vec<String> {
    books
        .as_array()
        .map(|books| {
            books
                .iter()
                .filter_map(|b| b["id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
