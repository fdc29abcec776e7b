//! Behaviour both engines must share. Every test runs against each engine
//! and, where it makes sense, compares their JSON output.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, json};
use tempfile::TempDir;

use bookshelf_core::{
    Book, BookId, BookPatch, CartItemId, CategoryFilter, CategoryId, Document, Order, OrderId,
    OrderItem, Price, User, UserFilter, UserId, UserPatch,
};

use super::{JsonStore, SqliteStore, Store, StoreError};

fn catalog() -> Document {
    serde_json::from_value(json!({
        "booksData": [
            {"id": "b1", "name": "Dune", "author": "Herbert", "price": 450, "categories": [1, 3]},
            {"id": "b2", "name": "Emma", "author": "Austen", "price": 120.5, "categories": [2]},
            {"id": "b3", "name": "Atlas", "author": "Anon", "price": 99, "out_of_stock": 1}
        ],
        "categories": [
            {"id": 1, "name": "Science Fiction"},
            {"id": 2, "name": "Romance"},
            {"id": 3, "name": "Classics"}
        ]
    }))
    .unwrap()
}

/// One store per engine, each seeded with the same catalog.
async fn engines() -> (TempDir, Vec<Arc<dyn Store>>) {
    let dir = tempfile::tempdir().unwrap();

    let json_path = dir.path().join("db.json");
    std::fs::write(&json_path, serde_json::to_vec(&catalog()).unwrap()).unwrap();
    let json = JsonStore::open(json_path).await.unwrap();

    let sqlite = SqliteStore::open(&dir.path().join("db.sqlite")).await.unwrap();
    sqlite.import_catalog(&catalog()).await.unwrap();

    (dir, vec![Arc::new(json), Arc::new(sqlite)])
}

fn user(id: &str, phone: &str) -> User {
    User {
        id: UserId::new(id),
        name: format!("User {id}"),
        email: format!("{id}@example.com"),
        phone: phone.to_string(),
        password: "pw".to_string(),
        address: String::new(),
        settings: Map::new(),
        extra: Map::new(),
    }
}

fn order(id: &str, user_id: &str, created_at: DateTime<Utc>) -> Order {
    Order {
        id: OrderId::new(id),
        ack: "ACK123456".to_string(),
        user_id: UserId::new(user_id),
        phone: "555".to_string(),
        address: "1 Main St".to_string(),
        items: vec![OrderItem::new(
            BookId::new("b1"),
            "Dune",
            2,
            "450".parse().unwrap(),
        )],
        total: "900".parse().unwrap(),
        created_at,
    }
}

fn at(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_books_have_identical_shape() {
    let (_dir, stores) = engines().await;

    let mut outputs = Vec::new();
    for store in &stores {
        let books = store.list_books(None).await.unwrap();
        outputs.push(serde_json::to_value(&books).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0][2]["out_of_stock"], json!(true));
    assert_eq!(outputs[0][0]["categories"], json!([1, 3]));
    assert_eq!(outputs[0][2]["categories"], json!([]));
}

#[tokio::test]
async fn test_category_filter_is_or() {
    let (_dir, stores) = engines().await;
    let filter = CategoryFilter::parse("2,3").unwrap().unwrap();

    for store in &stores {
        let books = store.list_books(Some(&filter)).await.unwrap();
        let ids: Vec<_> = books.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["b1", "b2"], "engine {}", store.kind());

        let single = CategoryFilter::parse("3").unwrap().unwrap();
        let books = store.list_books(Some(&single)).await.unwrap();
        assert!(books.iter().all(|b| b.categories.contains(&CategoryId::new(3))));
        assert_eq!(books.len(), 1);
    }
}

#[tokio::test]
async fn test_update_book_bumps_version() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        let before = store.books_version().await.unwrap();
        let updated = store
            .update_book(&BookId::new("b1"), &BookPatch::stock(true))
            .await
            .unwrap();
        let after = store.books_version().await.unwrap();

        assert!(after > before, "engine {}", store.kind());
        assert!(updated.out_of_stock);
        assert_eq!(updated.categories, vec![CategoryId::new(1), CategoryId::new(3)]);
        assert!(store.get_book(&BookId::new("b1")).await.unwrap().out_of_stock);

        let again = store
            .update_book(&BookId::new("b1"), &BookPatch::stock(false))
            .await
            .unwrap();
        assert!(!again.out_of_stock);
        assert!(store.books_version().await.unwrap() > after);
    }
}

#[tokio::test]
async fn test_update_book_errors() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        let before = store.books_version().await.unwrap();
        assert!(matches!(
            store.update_book(&BookId::new("b1"), &BookPatch::default()).await,
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            store.update_book(&BookId::new("nope"), &BookPatch::stock(true)).await,
            Err(StoreError::NotFound)
        ));
        assert_eq!(store.books_version().await.unwrap(), before);
    }
}

#[tokio::test]
async fn test_update_book_price() {
    let (_dir, stores) = engines().await;
    let patch = BookPatch {
        price: Some("512.75".parse().unwrap()),
        name: Some("Dune Messiah".to_string()),
        ..BookPatch::default()
    };

    for store in &stores {
        store.update_book(&BookId::new("b1"), &patch).await.unwrap();
        let book = store.get_book(&BookId::new("b1")).await.unwrap();
        assert_eq!(book.price, "512.75".parse::<Price>().unwrap());
        assert_eq!(book.name, "Dune Messiah");
        assert_eq!(book.author, "Herbert");
    }
}

#[tokio::test]
async fn test_categories() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        assert_eq!(store.list_categories().await.unwrap().len(), 3);
        let category = store.get_category(CategoryId::new(2)).await.unwrap();
        assert_eq!(category.name, "Romance");
        assert!(matches!(
            store.get_category(CategoryId::new(42)).await,
            Err(StoreError::NotFound)
        ));
    }
}

#[tokio::test]
async fn test_add_to_cart_accumulates() {
    let (_dir, stores) = engines().await;
    let u1 = UserId::new("u1");
    let b1 = BookId::new("b1");

    for store in &stores {
        let first = store
            .add_cart_line(&u1, &b1, 1, at("2024-01-01T00:00:00Z"))
            .await
            .unwrap();
        let second = store
            .add_cart_line(&u1, &b1, 1, at("2024-01-01T00:00:05.500Z"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 2);
        assert_eq!(second.added_at, at("2024-01-01T00:00:05.500Z"));

        let cart = store.list_cart(&u1).await.unwrap();
        assert_eq!(cart.len(), 1, "engine {}", store.kind());
        assert_eq!(cart[0], second);
    }
}

#[tokio::test]
async fn test_cart_lines_belong_to_their_user() {
    let (_dir, stores) = engines().await;
    let now = at("2024-01-01T00:00:00Z");

    for store in &stores {
        let line = store
            .add_cart_line(&UserId::new("a"), &BookId::new("b1"), 3, now)
            .await
            .unwrap();

        assert!(matches!(
            store.remove_cart_line(&UserId::new("b"), line.id).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.set_cart_quantity(&UserId::new("b"), line.id, 1).await,
            Err(StoreError::NotFound)
        ));

        let updated = store
            .set_cart_quantity(&UserId::new("a"), line.id, 1)
            .await
            .unwrap();
        assert_eq!(updated.quantity, 1);

        store.remove_cart_line(&UserId::new("a"), line.id).await.unwrap();
        assert!(store.list_cart(&UserId::new("a")).await.unwrap().is_empty());
        assert!(matches!(
            store.remove_cart_line(&UserId::new("a"), CartItemId::new(999)).await,
            Err(StoreError::NotFound)
        ));
    }
}

#[tokio::test]
async fn test_clear_cart_counts_lines() {
    let (_dir, stores) = engines().await;
    let now = at("2024-01-01T00:00:00Z");
    let u1 = UserId::new("u1");

    for store in &stores {
        store.add_cart_line(&u1, &BookId::new("b1"), 1, now).await.unwrap();
        store.add_cart_line(&u1, &BookId::new("b2"), 1, now).await.unwrap();

        assert_eq!(store.clear_cart(&u1).await.unwrap(), 2);
        assert_eq!(store.clear_cart(&u1).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_place_order_clears_cart() {
    let (_dir, stores) = engines().await;
    let u1 = UserId::new("u1");
    let u2 = UserId::new("u2");
    let now = at("2024-01-01T00:00:00Z");

    for store in &stores {
        store.add_cart_line(&u1, &BookId::new("b1"), 2, now).await.unwrap();
        store.add_cart_line(&u2, &BookId::new("b1"), 1, now).await.unwrap();

        let placed = order("ORD1", "u1", at("2024-01-02T00:00:00.123Z"));
        store.place_order(&placed).await.unwrap();

        assert!(store.list_cart(&u1).await.unwrap().is_empty());
        assert_eq!(store.list_cart(&u2).await.unwrap().len(), 1);

        let orders = store.list_orders(&u1).await.unwrap();
        assert_eq!(orders, vec![placed.clone()], "engine {}", store.kind());
        assert_eq!(store.get_order(&placed.id).await.unwrap(), placed);

        assert!(matches!(
            store.place_order(&placed).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            store.get_order(&OrderId::new("ORD404")).await,
            Err(StoreError::NotFound)
        ));
    }
}

#[tokio::test]
async fn test_orders_newest_first() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        for (id, created) in [
            ("ORD1", "2024-01-01T00:00:00Z"),
            ("ORD3", "2024-03-01T00:00:00Z"),
            ("ORD2", "2024-02-01T00:00:00Z"),
        ] {
            store.place_order(&order(id, "u1", at(created))).await.unwrap();
        }
        store
            .place_order(&order("ORD9", "someone-else", at("2025-01-01T00:00:00Z")))
            .await
            .unwrap();

        let ids: Vec<_> = store
            .list_orders(&UserId::new("u1"))
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id.into_inner())
            .collect();
        assert_eq!(ids, ["ORD3", "ORD2", "ORD1"]);
    }
}

#[tokio::test]
async fn test_users_crud() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        let mut alice = user("u1", "8793895938");
        alice.extra.insert("role".to_string(), json!("buyer"));
        store.create_user(alice.clone()).await.unwrap();
        store.create_user(user("u2", "111")).await.unwrap();

        assert!(matches!(
            store.create_user(user("u1", "222")).await,
            Err(StoreError::Conflict(_))
        ));

        let by_phone = UserFilter::new([("phone".to_string(), "8793895938".to_string())]);
        assert_eq!(store.list_users(&by_phone).await.unwrap(), vec![alice.clone()]);
        assert_eq!(store.list_users(&UserFilter::default()).await.unwrap().len(), 2);

        let by_role = UserFilter::new([("role".to_string(), "buyer".to_string())]);
        assert_eq!(store.list_users(&by_role).await.unwrap().len(), 1);

        let patch: UserPatch =
            serde_json::from_value(json!({"address": "221B Baker St", "nickname": "al"})).unwrap();
        let updated = store.update_user(&alice.id, &patch).await.unwrap();
        assert_eq!(updated.address, "221B Baker St");
        assert_eq!(updated.extra.get("nickname"), Some(&json!("al")));
        assert_eq!(updated.extra.get("role"), Some(&json!("buyer")));
        assert_eq!(store.get_user(&alice.id).await.unwrap(), updated);

        assert!(matches!(
            store.update_user(&UserId::new("ghost"), &patch).await,
            Err(StoreError::NotFound)
        ));
        let bad: UserPatch = serde_json::from_value(json!({"name": {"first": "A"}})).unwrap();
        assert!(matches!(
            store.update_user(&alice.id, &bad).await,
            Err(StoreError::Invalid(_))
        ));
    }
}

#[tokio::test]
async fn test_settings_merge_shallow() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        store.create_user(user("u1", "1")).await.unwrap();
        let id = UserId::new("u1");

        let first = json!({"theme": "dark", "lang": "en"}).as_object().cloned().unwrap();
        store.merge_user_settings(&id, first).await.unwrap();
        let second = json!({"lang": "fr"}).as_object().cloned().unwrap();
        let merged = store.merge_user_settings(&id, second).await.unwrap();

        assert_eq!(json!(merged), json!({"theme": "dark", "lang": "fr"}));
        assert_eq!(json!(store.get_user(&id).await.unwrap().settings), json!(merged));

        assert!(matches!(
            store.merge_user_settings(&UserId::new("ghost"), Map::new()).await,
            Err(StoreError::NotFound)
        ));
    }
}

#[tokio::test]
async fn test_update_user_merges_settings() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        store.create_user(user("u1", "1")).await.unwrap();
        let id = UserId::new("u1");
        let theme = json!({"theme": "dark"}).as_object().cloned().unwrap();
        store.merge_user_settings(&id, theme).await.unwrap();

        let patch: UserPatch =
            serde_json::from_value(json!({"settings": {"lang": "en"}, "address": "1 Main St"}))
                .unwrap();
        let updated = store.update_user(&id, &patch).await.unwrap();
        assert_eq!(json!(updated.settings), json!({"theme": "dark", "lang": "en"}));
        assert_eq!(updated.address, "1 Main St");

        let stored = store.get_user(&id).await.unwrap();
        assert_eq!(json!(stored.settings), json!({"theme": "dark", "lang": "en"}));
    }
}

#[tokio::test]
async fn test_get_book_not_found() {
    let (_dir, stores) = engines().await;

    for store in &stores {
        assert!(matches!(
            store.get_book(&BookId::new("missing")).await,
            Err(StoreError::NotFound)
        ));
        let book: Book = store.get_book(&BookId::new("b2")).await.unwrap();
        assert_eq!(book.price, "120.5".parse::<Price>().unwrap());
    }
}
