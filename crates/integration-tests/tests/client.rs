//! The client crate against a live API: catalog cache, optimistic cart and
//! checkout.
//!
//! Run with: cargo test -p bookshelf-integration-tests --test client

#![allow(clippy::indexing_slicing, clippy::unwrap_used)]

use bookshelf_client::{BookCache, CartService, MutationKind, MutationState, NoticeLevel, Notices};
use bookshelf_core::{BookId, BookPatch, Price, UserId};
use bookshelf_integration_tests::{ENGINES, TestServer};

fn cart_for(server: &TestServer, user: &str) -> CartService {
    CartService::new(server.client(), UserId::new(user), Notices::new())
}

// ============================================================================
// Catalog cache
// ============================================================================

#[tokio::test]
async fn test_cache_follows_books_version() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let api = server.client();
        let cache = BookCache::new(api.clone(), Some(server.data_dir().join("catalog.json")));

        let books = cache.load_books(false).await.expect("initial load");
        assert_eq!(books.len(), 3, "{mode:?}");
        assert_eq!(cache.cached_version(), Some(server.books_version().await));

        let b1 = BookId::new("b1");
        api.update_book(&b1, &BookPatch::stock(true))
            .await
            .expect("admin update");

        let books = cache.load_books(false).await.expect("reload");
        let b1_stock = books.iter().find(|b| b.id == b1).map(|b| b.out_of_stock);
        assert_eq!(b1_stock, Some(true), "{mode:?}: stale cache must be refetched");
        assert_eq!(cache.cached_version(), Some(server.books_version().await));
    }
}

#[tokio::test]
async fn test_snapshot_reused_across_instances() {
    let server = TestServer::start(ENGINES[1]).await;
    let path = server.data_dir().join("catalog.json");

    let first = BookCache::new(server.client(), Some(path.clone()));
    let books = first.load_books(false).await.expect("initial load");

    let second = BookCache::new(server.client(), Some(path.clone()));
    assert_eq!(second.load_books(false).await.expect("cached load"), books);

    second.invalidate_cache().await.expect("invalidate");
    assert!(!path.exists());
    assert!(second.cached_books().is_empty());
}

// ============================================================================
// Optimistic cart
// ============================================================================

#[tokio::test]
async fn test_add_is_confirmed_by_server() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let cache = BookCache::new(server.client(), None);
        let books = cache.load_books(false).await.expect("catalog");
        let cart = cart_for(&server, "u1");

        let dune = books.iter().find(|b| b.id.as_str() == "b1").expect("b1");
        let first = cart.add_to_cart(dune).await;
        let second = cart.add_to_cart(dune).await;

        assert_eq!(first.kind, MutationKind::Add);
        assert_eq!(first.state, MutationState::Confirmed, "{mode:?}");
        assert_eq!(second.state, MutationState::Confirmed, "{mode:?}");
        assert!(second.id > first.id);

        let state = cart.snapshot();
        let line = state.line(&dune.id).expect("line for b1");
        assert_eq!(line.quantity, 2);
        assert!(line.line_id.is_some());
        assert!(!state.has_pending());

        let server_cart = server.client().cart(&UserId::new("u1")).await.expect("cart");
        assert_eq!(server_cart.len(), 1);
        assert_eq!(server_cart[0].quantity, 2);
    }
}

#[tokio::test]
async fn test_out_of_stock_add_rolls_back_with_notice() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let cache = BookCache::new(server.client(), None);
        let books = cache.load_books(false).await.expect("catalog");
        let cart = cart_for(&server, "u1");
        let mut notices = cart.notices().subscribe();

        let ulysses = books.iter().find(|b| b.out_of_stock).expect("b3");
        let mutation = cart.add_to_cart(ulysses).await;

        assert_eq!(mutation.state, MutationState::RolledBack, "{mode:?}");
        assert!(cart.snapshot().is_empty());

        let notice = notices.recv().await.expect("notice");
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.message, "Ulysses is out of stock");
    }
}

#[tokio::test]
async fn test_remove_one_and_all_follow_server() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let cache = BookCache::new(server.client(), None);
        let books = cache.load_books(false).await.expect("catalog");
        let cart = cart_for(&server, "u1");
        let user = UserId::new("u1");

        for book in books.iter().filter(|b| !b.out_of_stock) {
            cart.add_to_cart(book).await;
            cart.add_to_cart(book).await;
        }
        assert_eq!(cart.snapshot().count(), 4, "{mode:?}");

        let b1 = BookId::new("b1");
        let removed = cart.remove_one(&b1).await.expect("b1 is in the cart");
        assert_eq!(removed.state, MutationState::Confirmed, "{mode:?}");
        assert_eq!(cart.snapshot().line(&b1).map(|l| l.quantity), Some(1));

        cart.remove_one(&b1).await.expect("b1 still in the cart");
        assert!(cart.snapshot().line(&b1).is_none(), "{mode:?}");

        let b2 = BookId::new("b2");
        let dropped = cart.remove_all(&b2).await.expect("b2 is in the cart");
        assert_eq!(dropped.kind, MutationKind::RemoveAll);
        assert_eq!(dropped.state, MutationState::Confirmed, "{mode:?}");

        assert!(cart.snapshot().is_empty());
        let server_cart = server.client().cart(&user).await.expect("cart");
        assert!(server_cart.is_empty(), "{mode:?}");
    }
}

#[tokio::test]
async fn test_remove_during_add_reaches_server() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let cache = BookCache::new(server.client(), None);
        let books = cache.load_books(false).await.expect("catalog");
        let cart = cart_for(&server, "u1");
        let user = UserId::new("u1");
        let dune = books.iter().find(|b| b.id.as_str() == "b1").expect("b1");

        let (added, removed) = tokio::join!(cart.add_to_cart(dune), cart.remove_one(&dune.id));
        assert_eq!(added.state, MutationState::Confirmed, "{mode:?}");
        assert_eq!(removed.map(|m| m.state), Some(MutationState::Confirmed), "{mode:?}");
        assert!(cart.snapshot().line(&dune.id).is_none(), "{mode:?}");
        assert!(!cart.snapshot().has_pending());
        let server_cart = server.client().cart(&user).await.expect("cart");
        assert!(server_cart.is_empty(), "{mode:?}: removed line left on the server");

        cart.add_to_cart(dune).await;
        let (added, dropped) = tokio::join!(cart.add_to_cart(dune), cart.remove_all(&dune.id));
        assert_eq!(added.state, MutationState::Confirmed, "{mode:?}");
        assert_eq!(dropped.map(|m| m.state), Some(MutationState::Confirmed), "{mode:?}");
        assert!(cart.snapshot().is_empty(), "{mode:?}");
        let server_cart = server.client().cart(&user).await.expect("cart");
        assert!(server_cart.is_empty(), "{mode:?}");

        let (_, placed) = tokio::join!(
            cart.add_to_cart(dune),
            cart.checkout("1 Main St", "5550001")
        );
        let order = placed.expect("checkout after the add");
        assert_eq!(order.items.len(), 1, "{mode:?}");
        assert!(cart.snapshot().is_empty(), "{mode:?}");
    }
}

#[tokio::test]
async fn test_hydrate_names_lines_from_catalog() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let (status, _) = server
            .post("/cart/u1", &serde_json::json!({"bookId": "b2", "quantity": 3}))
            .await;
        assert!(status.is_success());

        let cache = BookCache::new(server.client(), None);
        let cart = cart_for(&server, "u1");
        cart.hydrate(&cache).await.expect("hydrate");

        let state = cart.snapshot();
        let line = state.line(&BookId::new("b2")).expect("hydrated line");
        assert_eq!(line.name, "Emma", "{mode:?}");
        assert_eq!(line.author, "Jane Austen");
        assert_eq!(line.quantity, 3);
        assert_eq!(state.total(), "361.5".parse::<Price>().expect("price"));
    }
}

#[tokio::test]
async fn test_clear_and_checkout() {
    for mode in ENGINES {
        let server = TestServer::start(mode).await;
        let cache = BookCache::new(server.client(), None);
        let books = cache.load_books(false).await.expect("catalog");
        let cart = cart_for(&server, "u1");
        let dune = books.iter().find(|b| b.id.as_str() == "b1").expect("b1");
        let emma = books.iter().find(|b| b.id.as_str() == "b2").expect("b2");

        cart.add_to_cart(emma).await;
        let cleared = cart.clear_cart().await;
        assert_eq!(cleared.kind, MutationKind::Clear);
        assert_eq!(cleared.state, MutationState::Confirmed, "{mode:?}");
        assert!(cart.snapshot().is_empty());

        cart.add_to_cart(dune).await;
        cart.add_to_cart(emma).await;
        let mut notices = cart.notices().subscribe();
        let order = cart.checkout("1 Main St", "5550001").await.expect("checkout");

        assert_eq!(order.user_id.as_str(), "u1");
        assert_eq!(order.items.len(), 2, "{mode:?}");
        assert_eq!(order.total, "570.5".parse::<Price>().expect("price"));
        assert!(cart.snapshot().is_empty());
        assert_eq!(notices.recv().await.expect("notice").level, NoticeLevel::Info);

        let user = UserId::new("u1");
        assert!(server.client().cart(&user).await.expect("cart").is_empty());
        let orders = server.client().orders_for_user(&user).await.expect("orders");
        assert_eq!(orders.first().map(|o| &o.id), Some(&order.id), "{mode:?}");
    }
}

#[tokio::test]
async fn test_checkout_of_empty_cart_is_refused() {
    let server = TestServer::start(ENGINES[0]).await;
    let cart = cart_for(&server, "u1");

    let err = cart.checkout("1 Main St", "5550001").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("items required"));
}
