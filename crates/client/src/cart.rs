//! Optimistic cart backed by the server-side cart.
//!
//! Every mutation is applied to local state first, then sent to the API.
//! Each one is tracked as a [`Mutation`] that moves from
//! [`MutationState::Pending`] to either `Confirmed` or `RolledBack`.
//! A rollback applies the inverse delta rather than restoring a snapshot, so
//! overlapping mutations on the same line do not clobber each other.
//!
//! A line only adopts the server's quantity once no other mutation on it is
//! still in flight.
//!
//! Local changes apply at once, but server calls run one at a time in the
//! order the mutations started. A removal that starts while its line is still
//! being added waits for the add and then acts on the line the server created.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

use bookshelf_core::{
    AddCartLine, Book, BookId, CartItem, CartItemId, NewOrder, Order, OrderItem, Price, UserId,
};

use crate::api::ApiClient;
use crate::cache::BookCache;
use crate::error::ClientError;
use crate::observable::{Notices, Observable};

/// One book in the local cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartEntry {
    pub book_id: BookId,
    pub name: String,
    pub author: String,
    pub price: Price,
    pub quantity: u32,
    /// Server-side line, once the server has confirmed one
    pub line_id: Option<CartItemId>,
    pending: u32,
}

impl CartEntry {
    fn from_book(book: &Book) -> Self {
        Self {
            book_id: book.id.clone(),
            name: book.name.clone(),
            author: book.author.clone(),
            price: book.price,
            quantity: 0,
            line_id: None,
            pending: 0,
        }
    }

    /// Line for a book the catalog does not know (e.g. deleted since).
    fn unknown(book_id: &BookId) -> Self {
        Self {
            book_id: book_id.clone(),
            name: book_id.to_string(),
            author: String::new(),
            price: Price::default(),
            quantity: 0,
            line_id: None,
            pending: 0,
        }
    }

    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }

    /// Whether a mutation on this line is still waiting for the server.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending > 0
    }
}

/// The local cart as seen by subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartState {
    entries: Vec<CartEntry>,
}

impl CartState {
    /// Lines with a positive quantity, in the order they were first added.
    pub fn lines(&self) -> impl Iterator<Item = &CartEntry> {
        self.entries.iter().filter(|e| e.quantity > 0)
    }

    #[must_use]
    pub fn line(&self, book_id: &BookId) -> Option<&CartEntry> {
        self.lines().find(|e| &e.book_id == book_id)
    }

    /// Total number of copies.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.lines().map(|e| e.quantity).sum()
    }

    #[must_use]
    pub fn total(&self) -> Price {
        self.lines().map(CartEntry::line_total).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines().next().is_none()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(CartEntry::is_pending)
    }

    /// Server line id of a book, whatever its local quantity.
    fn line_id(&self, book_id: &BookId) -> Option<CartItemId> {
        self.entries
            .iter()
            .find(|e| &e.book_id == book_id)
            .and_then(|e| e.line_id)
    }

    fn entry_mut(&mut self, template: &CartEntry) -> Option<&mut CartEntry> {
        if !self.entries.iter().any(|e| e.book_id == template.book_id) {
            self.entries.push(CartEntry {
                quantity: 0,
                pending: 0,
                line_id: None,
                ..template.clone()
            });
        }
        self.entries.iter_mut().find(|e| e.book_id == template.book_id)
    }

    /// Shift the line's quantity by `delta` and mark a mutation in flight.
    fn begin(&mut self, template: &CartEntry, delta: i64) {
        if let Some(entry) = self.entry_mut(template) {
            entry.quantity = shift(entry.quantity, delta);
            entry.pending += 1;
        }
    }

    /// Undo the delta of a failed mutation.
    fn revert(&mut self, template: &CartEntry, delta: i64) {
        if let Some(entry) = self.entry_mut(template) {
            entry.quantity = shift(entry.quantity, -delta);
        }
    }

    /// Close a mutation, adopting the server line when nothing else is in flight.
    fn settle(&mut self, book_id: &BookId, server: Option<&CartItem>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| &e.book_id == book_id) {
            entry.pending = entry.pending.saturating_sub(1);
            if let Some(item) = server {
                entry.line_id = Some(item.id);
                if entry.pending == 0 {
                    entry.quantity = item.quantity;
                }
            }
        }
        self.entries.retain(|e| e.quantity > 0 || e.pending > 0);
    }
}

fn shift(quantity: u32, delta: i64) -> u32 {
    let shifted = i64::from(quantity).saturating_add(delta);
    u32::try_from(shifted.max(0)).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Add,
    RemoveOne,
    RemoveAll,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    /// Applied locally, not yet answered by the server
    Pending,
    Confirmed,
    /// The server refused or could not be reached; the local delta was undone
    RolledBack,
}

/// One optimistic change to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub id: u64,
    pub kind: MutationKind,
    /// `None` for whole-cart mutations
    pub book_id: Option<BookId>,
    pub state: MutationState,
}

impl Mutation {
    fn settle(mut self, confirmed: bool) -> Self {
        self.state = if confirmed {
            MutationState::Confirmed
        } else {
            MutationState::RolledBack
        };
        self
    }
}

/// A user's cart kept in step with the API.
#[derive(Debug)]
pub struct CartService {
    api: ApiClient,
    user_id: UserId,
    state: Observable<CartState>,
    notices: Notices,
    next_mutation: AtomicU64,
    /// Held across each server call so calls land in mutation order
    server_calls: Mutex<()>,
}

impl CartService {
    #[must_use]
    pub fn new(api: ApiClient, user_id: UserId, notices: Notices) -> Self {
        Self {
            api,
            user_id,
            state: Observable::default(),
            notices,
            next_mutation: AtomicU64::new(1),
            server_calls: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.state.get()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    #[must_use]
    pub const fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Replace local state with the server cart, naming lines from the catalog.
    ///
    /// Meant for start-up; mutations in flight are discarded.
    ///
    /// # Errors
    ///
    /// Returns error if the cart or the catalog cannot be fetched.
    #[instrument(skip(self, books), fields(user_id = %self.user_id))]
    pub async fn hydrate(&self, books: &BookCache) -> Result<(), ClientError> {
        let items = self.api.cart(&self.user_id).await?;
        books.load_books(false).await?;

        let entries = items
            .iter()
            .map(|item| {
                let template = books.find(&item.book_id).map_or_else(
                    || CartEntry::unknown(&item.book_id),
                    |book| CartEntry::from_book(&book),
                );
                CartEntry {
                    quantity: item.quantity,
                    line_id: Some(item.id),
                    ..template
                }
            })
            .collect();

        self.state.set(CartState { entries });
        debug!(lines = items.len(), "Cart hydrated");
        Ok(())
    }

    /// Add one copy of `book`.
    ///
    /// A 409 from the server means the book is out of stock; the line is
    /// rolled back and a warning notice is sent.
    #[instrument(skip(self, book), fields(user_id = %self.user_id, book_id = %book.id))]
    pub async fn add_to_cart(&self, book: &Book) -> Mutation {
        let mutation = self.start(MutationKind::Add, Some(&book.id));
        let template = CartEntry::from_book(book);
        self.state.update(|s| s.begin(&template, 1));
        let _turn = self.server_calls.lock().await;

        let line = AddCartLine::new(book.id.clone(), 1);
        match self.api.add_to_cart(&self.user_id, &line).await {
            Ok(item) => {
                self.state.update(|s| s.settle(&book.id, Some(&item)));
                self.finish(mutation, true)
            }
            Err(e) => {
                self.state.update(|s| {
                    s.revert(&template, 1);
                    s.settle(&book.id, None);
                });
                if e.is_conflict() {
                    self.notices.warning(format!("{} is out of stock", book.name));
                } else {
                    self.notices
                        .error(format!("Could not add {} to the cart: {e}", book.name));
                }
                self.finish(mutation, false)
            }
        }
    }

    /// Take one copy of a book out; the line disappears at zero.
    ///
    /// Returns `None` when the book is not in the cart.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn remove_one(&self, book_id: &BookId) -> Option<Mutation> {
        let template = self.state.update(|s| {
            let template = s.line(book_id).cloned()?;
            s.begin(&template, -1);
            Some(template)
        })?;
        let mutation = self.start(MutationKind::RemoveOne, Some(book_id));
        let remaining = self.state.with(|s| s.line(book_id).map_or(0, |e| e.quantity));

        // An add still in flight settles first and leaves its line id behind.
        let _turn = self.server_calls.lock().await;
        let result = match self.state.with(|s| s.line_id(book_id)) {
            None => Ok(None),
            Some(line) if remaining > 0 => self
                .api
                .set_cart_quantity(&self.user_id, line, remaining)
                .await
                .map(Some),
            Some(line) => self.delete_line(line).await.map(|()| None),
        };

        Some(self.close_line_mutation(mutation, &template, -1, result))
    }

    /// Drop every copy of a book.
    ///
    /// Returns `None` when the book is not in the cart.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn remove_all(&self, book_id: &BookId) -> Option<Mutation> {
        let (template, removed) = self.state.update(|s| {
            let template = s.line(book_id).cloned()?;
            let removed = -i64::from(template.quantity);
            s.begin(&template, removed);
            Some((template, removed))
        })?;
        let mutation = self.start(MutationKind::RemoveAll, Some(book_id));

        let _turn = self.server_calls.lock().await;
        let result = match self.state.with(|s| s.line_id(book_id)) {
            None => Ok(None),
            Some(line) => self.delete_line(line).await.map(|()| None),
        };

        Some(self.close_line_mutation(mutation, &template, removed, result))
    }

    /// Empty the cart.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn clear_cart(&self) -> Mutation {
        let mutation = self.start(MutationKind::Clear, None);
        let removed: Vec<(CartEntry, i64)> = self.state.update(|s| {
            let lines: Vec<CartEntry> = s.lines().cloned().collect();
            lines
                .into_iter()
                .map(|entry| {
                    let delta = -i64::from(entry.quantity);
                    s.begin(&entry, delta);
                    (entry, delta)
                })
                .collect()
        });

        let _turn = self.server_calls.lock().await;
        match self.api.clear_cart(&self.user_id).await {
            Ok(deleted) => {
                self.state.update(|s| {
                    for (entry, _) in &removed {
                        s.settle(&entry.book_id, None);
                    }
                });
                debug!(deleted, "Cart cleared");
                self.finish(mutation, true)
            }
            Err(e) => {
                self.state.update(|s| {
                    for (entry, delta) in &removed {
                        s.revert(entry, *delta);
                        s.settle(&entry.book_id, None);
                    }
                });
                self.notices.error(format!("Could not clear the cart: {e}"));
                self.finish(mutation, false)
            }
        }
    }

    /// Place an order for everything in the cart.
    ///
    /// Mutations started earlier reach the server first. The server empties
    /// its cart with the order; the local lines follow on success and are
    /// kept on failure.
    ///
    /// # Errors
    ///
    /// Returns error if the order is refused (e.g. an empty cart) or the
    /// request fails.
    #[instrument(skip(self, address, phone), fields(user_id = %self.user_id))]
    pub async fn checkout(&self, address: &str, phone: &str) -> Result<Order, ClientError> {
        let _turn = self.server_calls.lock().await;
        let items: Vec<OrderItem> = self.state.with(|s| {
            s.lines()
                .map(|e| OrderItem::new(e.book_id.clone(), e.name.clone(), e.quantity, e.price))
                .collect()
        });
        let order = NewOrder {
            user_id: Some(self.user_id.clone()),
            total: items.iter().map(OrderItem::line_total).sum(),
            items,
            address: address.to_string(),
            phone: phone.to_string(),
        };

        match self.api.place_order(&order).await {
            Ok(placed) => {
                self.state.update(|s| s.entries.retain(CartEntry::is_pending));
                info!(order_id = %placed.id, total = %placed.total, "Checked out");
                self.notices.info(format!("Order {} placed", placed.id));
                Ok(placed)
            }
            Err(e) => {
                warn!(error = %e, "Checkout failed");
                self.notices.error(format!("Could not place the order: {e}"));
                Err(e)
            }
        }
    }

    /// Delete a server line; one that is already gone counts as deleted.
    async fn delete_line(&self, line: CartItemId) -> Result<(), ClientError> {
        match self.api.remove_cart_line(&self.user_id, line).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    fn close_line_mutation(
        &self,
        mutation: Mutation,
        template: &CartEntry,
        delta: i64,
        result: Result<Option<CartItem>, ClientError>,
    ) -> Mutation {
        match result {
            Ok(item) => {
                self.state.update(|s| s.settle(&template.book_id, item.as_ref()));
                self.finish(mutation, true)
            }
            Err(e) => {
                self.state.update(|s| {
                    s.revert(template, delta);
                    s.settle(&template.book_id, None);
                });
                self.notices
                    .error(format!("Could not update {} in the cart: {e}", template.name));
                self.finish(mutation, false)
            }
        }
    }

    fn start(&self, kind: MutationKind, book_id: Option<&BookId>) -> Mutation {
        let mutation = Mutation {
            id: self.next_mutation.fetch_add(1, Ordering::Relaxed),
            kind,
            book_id: book_id.cloned(),
            state: MutationState::Pending,
        };
        debug!(id = mutation.id, ?kind, "Cart mutation pending");
        mutation
    }

    fn finish(&self, mutation: Mutation, confirmed: bool) -> Mutation {
        let mutation = mutation.settle(confirmed);
        if confirmed {
            debug!(id = mutation.id, kind = ?mutation.kind, "Cart mutation confirmed");
        } else {
            warn!(
                id = mutation.id,
                kind = ?mutation.kind,
                user_id = %self.user_id,
                "Cart mutation rolled back"
            );
        }
        mutation
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::ClientConfig;
    use crate::observable::NoticeLevel;

    fn book(id: &str, price: &str) -> Book {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": format!("Book {id}"),
            "author": "Anon",
            "price": price,
        }))
        .unwrap()
    }

    fn item(id: i64, book_id: &str, quantity: u32) -> CartItem {
        CartItem {
            id: CartItemId::new(id),
            user_id: UserId::new("u1"),
            book_id: BookId::new(book_id),
            quantity,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_state_totals() {
        let mut state = CartState::default();
        let b1 = CartEntry::from_book(&book("b1", "450"));
        let b2 = CartEntry::from_book(&book("b2", "120.5"));
        state.begin(&b1, 2);
        state.begin(&b2, 1);

        assert_eq!(state.count(), 3);
        assert_eq!(state.total(), "1020.5".parse::<Price>().unwrap());
        assert!(state.has_pending());

        state.settle(&b1.book_id, Some(&item(1, "b1", 2)));
        state.settle(&b2.book_id, Some(&item(2, "b2", 1)));
        assert!(!state.has_pending());
        assert_eq!(state.line(&b1.book_id).unwrap().line_id, Some(CartItemId::new(1)));
    }

    #[test]
    fn test_server_quantity_waits_for_inflight_mutations() {
        let mut state = CartState::default();
        let b1 = CartEntry::from_book(&book("b1", "10"));

        state.begin(&b1, 1);
        state.begin(&b1, 1);
        state.settle(&b1.book_id, Some(&item(1, "b1", 1)));
        assert_eq!(state.line(&b1.book_id).unwrap().quantity, 2);

        state.revert(&b1, 1);
        state.settle(&b1.book_id, None);
        assert_eq!(state.line(&b1.book_id).unwrap().quantity, 1);
        assert!(!state.has_pending());
    }

    #[test]
    fn test_line_disappears_at_zero() {
        let mut state = CartState::default();
        let b1 = CartEntry::from_book(&book("b1", "10"));

        state.begin(&b1, 1);
        state.settle(&b1.book_id, Some(&item(1, "b1", 1)));
        state.begin(&b1, -1);
        assert!(state.is_empty());
        assert_eq!(state.line_id(&b1.book_id), Some(CartItemId::new(1)));
        state.settle(&b1.book_id, None);
        assert!(state.entries.is_empty());
    }

    #[test]
    fn test_shift_clamps() {
        assert_eq!(shift(0, -1), 0);
        assert_eq!(shift(3, -1), 2);
        assert_eq!(shift(u32::MAX, 1), u32::MAX);
    }

    /// A client pointed at a port nobody listens on.
    async fn unreachable_client() -> ApiClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        ApiClient::new(&ClientConfig::new(&format!("http://{addr}")).unwrap()).unwrap()
    }

    async fn offline_cart() -> CartService {
        CartService::new(unreachable_client().await, UserId::new("u1"), Notices::new())
    }

    #[tokio::test]
    async fn test_unreachable_server_rolls_back_add() {
        let cart = offline_cart().await;
        let mut notices = cart.notices().subscribe();
        let changes = cart.subscribe();

        let mutation = cart.add_to_cart(&book("b1", "450")).await;

        assert_eq!(mutation.kind, MutationKind::Add);
        assert_eq!(mutation.state, MutationState::RolledBack);
        assert!(cart.snapshot().is_empty());
        assert!(!cart.snapshot().has_pending());
        assert!(changes.has_changed().unwrap());

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Could not add Book b1"));
    }

    #[tokio::test]
    async fn test_remove_missing_book_is_noop() {
        let cart = offline_cart().await;
        assert!(cart.remove_one(&BookId::new("b1")).await.is_none());
        assert!(cart.remove_all(&BookId::new("b1")).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_clear_restores_lines() {
        let cart = offline_cart().await;
        let b1 = CartEntry::from_book(&book("b1", "10"));
        cart.state.update(|s| {
            s.begin(&b1, 3);
            s.settle(&b1.book_id, Some(&item(4, "b1", 3)));
        });

        let mutation = cart.clear_cart().await;

        assert_eq!(mutation.state, MutationState::RolledBack);
        assert_eq!(cart.snapshot().count(), 3);
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart() {
        let cart = offline_cart().await;
        let b1 = CartEntry::from_book(&book("b1", "10"));
        cart.state.update(|s| {
            s.begin(&b1, 1);
            s.settle(&b1.book_id, Some(&item(4, "b1", 1)));
        });

        assert!(cart.checkout("1 Main St", "555").await.is_err());
        assert_eq!(cart.snapshot().count(), 1);
    }
}
