//! Catalog endpoints: books, categories and the books version.
//!
//! Run with: cargo test -p bookshelf-integration-tests --test catalog

use reqwest::StatusCode;
use serde_json::json;

use bookshelf_integration_tests::{ENGINES, TestServer, book_ids};

// ============================================================================
// Books
// ============================================================================

#[tokio::test]
async fn test_both_engines_return_identical_books() {
    let json = TestServer::start(ENGINES[0]).await;
    let sqlite = TestServer::start(ENGINES[1]).await;

    let (status, from_json) = json.get("/booksData").await;
    assert_eq!(status, StatusCode::OK);
    let (status, from_sqlite) = sqlite.get("/booksData").await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(from_json, from_sqlite);
    assert_eq!(book_ids(&from_json), ["b1", "b2", "b3"]);
    assert_eq!(from_json[2]["out_of_stock"], json!(true));
    assert_eq!(from_json[0]["categories"], json!([1, 3]));
}

#[tokio::test]
async fn test_category_filter_matches_any() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;

        let (_, books) = server.get("/booksData?category=3").await;
        assert_eq!(book_ids(&books), ["b1"], "{mode:?}");

        let (_, books) = server.get("/booksData?category=2,3").await;
        assert_eq!(book_ids(&books), ["b1", "b2", "b3"], "{mode:?}");

        let (_, books) = server.get("/booksData?category=99").await;
        assert_eq!(books, json!([]), "{mode:?}");

        let (_, books) = server.get("/booksData?category=").await;
        assert_eq!(book_ids(&books).len(), 3, "{mode:?}");
    }
}

#[tokio::test]
async fn test_bad_category_filter_is_rejected() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let (status, body) = server.get("/booksData?category=1,fiction").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{mode:?}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_get_book() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;

        let (status, book) = server.get("/booksData/b2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(book["name"], "Emma");
        assert_eq!(book["price"], json!(120.5));

        let (status, body) = server.get("/booksData/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{mode:?}");
        assert_eq!(body, json!({"error": "not found"}));
    }
}

#[tokio::test]
async fn test_update_book_bumps_version() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let before = server.books_version().await;

        let (status, book) = server
            .patch("/booksData/b1", &json!({"out_of_stock": true, "price": 500}))
            .await;
        assert_eq!(status, StatusCode::OK, "{mode:?}");
        assert_eq!(book["out_of_stock"], json!(true));
        assert_eq!(book["price"], json!(500.0));

        let after = server.books_version().await;
        assert!(after > before, "{mode:?}: {after} should exceed {before}");

        let (_, stored) = server.get("/booksData/b1").await;
        assert_eq!(stored, book);
    }
}

#[tokio::test]
async fn test_rejected_update_keeps_version() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let before = server.books_version().await;

        let (status, _) = server.patch("/booksData/b1", &json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{mode:?}");

        let (status, _) = server
            .patch("/booksData/missing", &json!({"out_of_stock": true}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{mode:?}");

        let (status, _) = server.patch("/booksData/b1", &json!({"price": "cheap"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{mode:?}");

        assert_eq!(server.books_version().await, before, "{mode:?}");
    }
}

#[tokio::test]
async fn test_stock_flag_accepts_legacy_integers() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let (status, book) = server.patch("/booksData/b3", &json!({"out_of_stock": 0})).await;
        assert_eq!(status, StatusCode::OK, "{mode:?}");
        assert_eq!(book["out_of_stock"], json!(false));
    }
}

// ============================================================================
// Categories
// ============================================================================

#[tokio::test]
async fn test_categories() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;

        let (status, categories) = server.get("/categories").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(categories.as_array().map(Vec::len), Some(3), "{mode:?}");

        let (status, category) = server.get("/categories/2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(category, json!({"id": 2, "name": "Classics"}));

        let (status, _) = server.get("/categories/42").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{mode:?}");

        let (status, _) = server.get("/categories/classics").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{mode:?}");
    }
}

// ============================================================================
// Plumbing
// ============================================================================

#[tokio::test]
async fn test_health_and_request_id() {
    let server = TestServer::start(ENGINES[0]).await;

    let response = server
        .http
        .get(server.url("/health/ready"))
        .header("x-request-id", "trace-me")
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me")
    );
}
