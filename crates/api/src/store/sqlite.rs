//! `SQLite` engine.
//!
//! # Tables
//!
//! - `meta` - key/value pairs; holds `books_version`
//! - `books`, `categories`, `book_categories` - the catalog
//! - `users` - with `settings` and `extra` JSON text columns
//! - `cart_items` - one row per (user, book)
//! - `orders` - with the item snapshot as JSON text
//!
//! Tables and missing columns are created at start-up. Older databases store
//! ids and flags with looser types, so reads cast every column to the type
//! the API returns.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use bookshelf_core::{
    Book, BookId, BookPatch, CartItem, CartItemId, Category, CategoryFilter, CategoryId, Document,
    Order, OrderId, OrderItem, Price, User, UserFilter, UserId, UserPatch, sort_newest_first,
};

use super::{Store, StoreError, StoreKind};
use crate::version;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT)",
    "CREATE TABLE IF NOT EXISTS books (
        id TEXT PRIMARY KEY,
        name TEXT,
        author TEXT,
        price REAL,
        image_url TEXT,
        pdf_url TEXT,
        out_of_stock INTEGER DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS categories (id INTEGER PRIMARY KEY, name TEXT)",
    "CREATE TABLE IF NOT EXISTS book_categories (book_id TEXT, category_id INTEGER)",
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT,
        email TEXT,
        phone TEXT,
        password TEXT,
        address TEXT,
        settings TEXT,
        extra TEXT
    )",
    "CREATE TABLE IF NOT EXISTS cart_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT,
        book_id TEXT,
        quantity INTEGER,
        added_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        ack TEXT,
        user_id TEXT,
        phone TEXT,
        address TEXT,
        total REAL,
        items TEXT,
        created_at TEXT
    )",
];

/// Columns added to `users` tables created before they existed.
const USER_COLUMNS: &[&str] = &[
    "name", "email", "phone", "password", "address", "settings", "extra",
];

const BOOK_COLUMNS: &str = "CAST(id AS TEXT) AS id,
    COALESCE(CAST(name AS TEXT), '') AS name,
    COALESCE(CAST(author AS TEXT), '') AS author,
    CAST(COALESCE(price, 0) AS REAL) AS price,
    COALESCE(CAST(image_url AS TEXT), '') AS image_url,
    COALESCE(CAST(pdf_url AS TEXT), '') AS pdf_url,
    CAST(COALESCE(out_of_stock, 0) AS INTEGER) AS out_of_stock";

const USER_SELECT: &str = "SELECT CAST(id AS TEXT) AS id,
    COALESCE(CAST(name AS TEXT), '') AS name,
    COALESCE(CAST(email AS TEXT), '') AS email,
    COALESCE(CAST(phone AS TEXT), '') AS phone,
    COALESCE(CAST(password AS TEXT), '') AS password,
    COALESCE(CAST(address AS TEXT), '') AS address,
    settings,
    extra
    FROM users";

const CART_SELECT: &str = "SELECT id,
    CAST(user_id AS TEXT) AS user_id,
    CAST(book_id AS TEXT) AS book_id,
    CAST(COALESCE(quantity, 0) AS INTEGER) AS quantity,
    COALESCE(CAST(added_at AS TEXT), '') AS added_at
    FROM cart_items";

const ORDER_SELECT: &str = "SELECT CAST(id AS TEXT) AS id,
    COALESCE(CAST(ack AS TEXT), '') AS ack,
    COALESCE(CAST(user_id AS TEXT), '') AS user_id,
    COALESCE(CAST(phone AS TEXT), '') AS phone,
    COALESCE(CAST(address AS TEXT), '') AS address,
    CAST(COALESCE(total, 0) AS REAL) AS total,
    COALESCE(CAST(items AS TEXT), '[]') AS items,
    COALESCE(CAST(created_at AS TEXT), '') AS created_at
    FROM orders";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: String,
    name: String,
    author: String,
    price: f64,
    image_url: String,
    pdf_url: String,
    out_of_stock: i64,
}

impl BookRow {
    fn into_book(self, categories: Vec<CategoryId>) -> Result<Book, StoreError> {
        let price = Price::from_f64(self.price).map_err(|e| {
            StoreError::DataCorruption(format!("invalid price for book {}: {e}", self.id))
        })?;

        Ok(Book {
            id: BookId::new(self.id),
            name: self.name,
            author: self.author,
            price,
            image_url: self.image_url,
            pdf_url: self.pdf_url,
            out_of_stock: self.out_of_stock != 0,
            categories,
        }
        .normalized())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    book_id: String,
    category_id: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    phone: String,
    password: String,
    address: String,
    settings: Option<String>,
    extra: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        // Unreadable settings read as empty, matching how they were always served.
        let settings = row
            .settings
            .as_deref()
            .and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
            .unwrap_or_default();
        let extra = match row.extra.as_deref().map(str::trim) {
            None | Some("") => Map::new(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                StoreError::DataCorruption(format!("invalid extra fields for user {}: {e}", row.id))
            })?,
        };

        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            email: row.email,
            phone: row.phone,
            password: row.password,
            address: row.address,
            settings,
            extra,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    id: i64,
    user_id: String,
    book_id: String,
    quantity: i64,
    added_at: String,
}

impl TryFrom<CartRow> for CartItem {
    type Error = StoreError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            StoreError::DataCorruption(format!("invalid quantity in cart line {}", row.id))
        })?;

        Ok(Self {
            id: CartItemId::new(row.id),
            user_id: UserId::new(row.user_id),
            book_id: BookId::new(row.book_id),
            quantity,
            added_at: parse_timestamp(&row.added_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    ack: String,
    user_id: String,
    phone: String,
    address: String,
    total: f64,
    items: String,
    created_at: String,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let items: Vec<OrderItem> = serde_json::from_str(&row.items).map_err(|e| {
            StoreError::DataCorruption(format!("invalid items in order {}: {e}", row.id))
        })?;
        let total = Price::from_f64(row.total).map_err(|e| {
            StoreError::DataCorruption(format!("invalid total in order {}: {e}", row.id))
        })?;

        Ok(Self {
            id: OrderId::new(row.id),
            ack: row.ack,
            user_id: UserId::new(row.user_id),
            phone: row.phone,
            address: row.address,
            items,
            total,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(DateTime::<Utc>::default());
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::DataCorruption(format!("invalid timestamp {raw:?}: {e}")))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// =============================================================================
// Store
// =============================================================================

/// Store backed by a `SQLite` database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and bring its schema
    /// up to date.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be opened or the schema cannot
    /// be created.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let existing: Vec<String> =
            sqlx::query_scalar("SELECT name FROM pragma_table_info('users')")
                .fetch_all(&self.pool)
                .await?;
        for column in USER_COLUMNS {
            if !existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                sqlx::query(&format!("ALTER TABLE users ADD COLUMN {column} TEXT"))
                    .execute(&self.pool)
                    .await?;
                tracing::info!(column, "added column to users table");
            }
        }

        sqlx::query("INSERT OR IGNORE INTO meta (key, value) VALUES ('books_version', ?)")
            .bind(version::now_millis().to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Import the catalog of the JSON document when no category links exist
    /// yet.
    ///
    /// A missing or unreadable document is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the import transaction fails.
    pub async fn backfill_from_json(&self, json_path: &Path) -> Result<(), StoreError> {
        let links: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_categories")
            .fetch_one(&self.pool)
            .await?;
        if links > 0 || !tokio::fs::try_exists(json_path).await? {
            return Ok(());
        }

        let document = match tokio::fs::read(json_path).await.map_err(StoreError::from).and_then(
            |raw| serde_json::from_slice::<Document>(&raw).map_err(StoreError::from),
        ) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, path = %json_path.display(), "skipping catalog backfill");
                return Ok(());
            }
        };

        self.import_catalog(&document).await?;
        tracing::info!(
            books = document.books_data.len(),
            categories = document.categories.len(),
            "backfilled catalog from json document"
        );
        Ok(())
    }

    /// Insert the books, categories and category links of `document` in one
    /// transaction. Existing books and categories are left untouched; the
    /// links of every imported book are replaced.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if any statement fails; nothing is
    /// imported in that case.
    pub async fn import_catalog(&self, document: &Document) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for category in &document.categories {
            sqlx::query("INSERT OR IGNORE INTO categories (id, name) VALUES (?, ?)")
                .bind(category.id.as_i64())
                .bind(&category.name)
                .execute(&mut *tx)
                .await?;
        }

        for book in &document.books_data {
            sqlx::query(
                "INSERT OR IGNORE INTO books (id, name, author, price, image_url, pdf_url, out_of_stock)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(book.id.as_str())
            .bind(&book.name)
            .bind(&book.author)
            .bind(book.price.to_f64())
            .bind(&book.image_url)
            .bind(&book.pdf_url)
            .bind(i64::from(book.out_of_stock))
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM book_categories WHERE CAST(book_id AS TEXT) = ?")
                .bind(book.id.as_str())
                .execute(&mut *tx)
                .await?;
            for category in &book.categories {
                sqlx::query("INSERT INTO book_categories (book_id, category_id) VALUES (?, ?)")
                    .bind(book.id.as_str())
                    .bind(category.as_i64())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn category_links(&self) -> Result<HashMap<String, Vec<CategoryId>>, StoreError> {
        let rows: Vec<LinkRow> = sqlx::query_as(
            "SELECT CAST(book_id AS TEXT) AS book_id, CAST(category_id AS INTEGER) AS category_id
             FROM book_categories
             WHERE book_id IS NOT NULL AND category_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut links: HashMap<String, Vec<CategoryId>> = HashMap::new();
        for row in rows {
            links
                .entry(row.book_id)
                .or_default()
                .push(CategoryId::new(row.category_id));
        }
        Ok(links)
    }

    async fn fetch_book(conn: &mut SqliteConnection, id: &BookId) -> Result<Book, StoreError> {
        let row: BookRow = sqlx::query_as(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE CAST(id AS TEXT) = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(StoreError::NotFound)?;

        let categories: Vec<i64> = sqlx::query_scalar(
            "SELECT CAST(category_id AS INTEGER) FROM book_categories
             WHERE CAST(book_id AS TEXT) = ? AND category_id IS NOT NULL",
        )
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        row.into_book(categories.into_iter().map(CategoryId::new).collect())
    }

    async fn fetch_user(conn: &mut SqliteConnection, id: &UserId) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(&format!("{USER_SELECT} WHERE CAST(id AS TEXT) = ?"))
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn fetch_cart_line(
        conn: &mut SqliteConnection,
        id: i64,
    ) -> Result<CartItem, StoreError> {
        let row: CartRow = sqlx::query_as(&format!("{CART_SELECT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn write_user(conn: &mut SqliteConnection, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users
             SET name = ?, email = ?, phone = ?, password = ?, address = ?, settings = ?, extra = ?
             WHERE CAST(id AS TEXT) = ?",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password)
        .bind(&user.address)
        .bind(serde_json::to_string(&user.settings)?)
        .bind(serde_json::to_string(&user.extra)?)
        .bind(user.id.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn list_books(&self, filter: Option<&CategoryFilter>) -> Result<Vec<Book>, StoreError> {
        let rows: Vec<BookRow> = match filter {
            None => {
                sqlx::query_as(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY rowid"))
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(filter) => {
                let mut query = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {BOOK_COLUMNS} FROM books WHERE CAST(id AS TEXT) IN (
                        SELECT CAST(book_id AS TEXT) FROM book_categories
                        WHERE CAST(category_id AS INTEGER) IN ("
                ));
                {
                    let mut ids = query.separated(", ");
                    for id in filter.ids() {
                        ids.push_bind(id.as_i64());
                    }
                }
                query.push(")) ORDER BY rowid");
                query.build_query_as().fetch_all(&self.pool).await?
            }
        };

        let mut links = self.category_links().await?;
        rows.into_iter()
            .map(|row| {
                let categories = links.remove(&row.id).unwrap_or_default();
                row.into_book(categories)
            })
            .collect()
    }

    async fn get_book(&self, id: &BookId) -> Result<Book, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_book(&mut conn, id).await
    }

    async fn update_book(&self, id: &BookId, patch: &BookPatch) -> Result<Book, StoreError> {
        if patch.is_empty() {
            return Err(StoreError::Invalid("no valid fields".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let mut book = Self::fetch_book(&mut tx, id).await?;
        book.apply(patch);

        sqlx::query(
            "UPDATE books
             SET name = ?, author = ?, price = ?, image_url = ?, pdf_url = ?, out_of_stock = ?
             WHERE CAST(id AS TEXT) = ?",
        )
        .bind(&book.name)
        .bind(&book.author)
        .bind(book.price.to_f64())
        .bind(&book.image_url)
        .bind(&book.pdf_url)
        .bind(i64::from(book.out_of_stock))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT CAST(value AS TEXT) FROM meta WHERE key = 'books_version'")
                .fetch_optional(&mut *tx)
                .await?;
        let next = version::next_version(
            version::parse_stored(current.as_deref()),
            version::now_millis(),
        );
        sqlx::query(
            "INSERT INTO meta (key, value) VALUES ('books_version', ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(next.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(book)
    }

    async fn books_version(&self) -> Result<i64, StoreError> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT CAST(value AS TEXT) FROM meta WHERE key = 'books_version'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(version::parse_stored(current.as_deref()))
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows: Vec<CategoryRow> = sqlx::query_as(
            "SELECT CAST(id AS INTEGER) AS id, COALESCE(CAST(name AS TEXT), '') AS name
             FROM categories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: CategoryId) -> Result<Category, StoreError> {
        let row: CategoryRow = sqlx::query_as(
            "SELECT CAST(id AS INTEGER) AS id, COALESCE(CAST(name AS TEXT), '') AS name
             FROM categories WHERE id = ?",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;
        Ok(row.into())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!("{USER_SELECT} ORDER BY rowid"))
            .fetch_all(&self.pool)
            .await?;

        let mut users = Vec::with_capacity(rows.len());
        for row in rows {
            let user = User::try_from(row)?;
            if filter.matches(&user) {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn create_user(&self, user: User) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        match Self::fetch_user(&mut tx, &user.id).await {
            Ok(_) => {
                return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
            }
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let inserted = sqlx::query(
            "INSERT INTO users (id, name, email, phone, password, address, settings, extra)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password)
        .bind(&user.address)
        .bind(serde_json::to_string(&user.settings)?)
        .bind(serde_json::to_string(&user.extra)?)
        .execute(&mut *tx)
        .await;

        match inserted {
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Conflict(format!("user {} already exists", user.id)))
            }
            Err(e) => Err(e.into()),
            Ok(_) => {
                tx.commit().await?;
                Ok(user)
            }
        }
    }

    async fn update_user(&self, id: &UserId, patch: &UserPatch) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = Self::fetch_user(&mut tx, id).await?;
        let updated = patch
            .apply(&user)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        Self::write_user(&mut tx, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn get_user(&self, id: &UserId) -> Result<User, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_user(&mut conn, id).await
    }

    async fn merge_user_settings(
        &self,
        id: &UserId,
        patch: Map<String, Value>,
    ) -> Result<Map<String, Value>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut user = Self::fetch_user(&mut tx, id).await?;
        user.merge_settings(patch);

        sqlx::query("UPDATE users SET settings = ? WHERE CAST(id AS TEXT) = ?")
            .bind(serde_json::to_string(&user.settings)?)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(user.settings)
    }

    async fn list_cart(&self, user_id: &UserId) -> Result<Vec<CartItem>, StoreError> {
        let rows: Vec<CartRow> =
            sqlx::query_as(&format!("{CART_SELECT} WHERE CAST(user_id AS TEXT) = ? ORDER BY id"))
                .bind(user_id.as_str())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn add_cart_line(
        &self,
        user_id: &UserId,
        book_id: &BookId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<CartItem, StoreError> {
        let mut tx = self.pool.begin().await?;
        let added_at = format_timestamp(now);

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM cart_items
             WHERE CAST(user_id AS TEXT) = ? AND CAST(book_id AS TEXT) = ?
             ORDER BY id LIMIT 1",
        )
        .bind(user_id.as_str())
        .bind(book_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let line_id = if let Some(id) = existing {
            sqlx::query(
                "UPDATE cart_items SET quantity = COALESCE(quantity, 0) + ?, added_at = ?
                 WHERE id = ?",
            )
            .bind(i64::from(quantity))
            .bind(&added_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        } else {
            sqlx::query(
                "INSERT INTO cart_items (user_id, book_id, quantity, added_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(user_id.as_str())
            .bind(book_id.as_str())
            .bind(i64::from(quantity))
            .bind(&added_at)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid()
        };

        let item = Self::fetch_cart_line(&mut tx, line_id).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn set_cart_quantity(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem, StoreError> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE cart_items SET quantity = ? WHERE id = ? AND CAST(user_id AS TEXT) = ?",
        )
        .bind(i64::from(quantity))
        .bind(item_id.as_i64())
        .bind(user_id.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        let item = Self::fetch_cart_line(&mut tx, item_id.as_i64()).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn remove_cart_line(
        &self,
        user_id: &UserId,
        item_id: CartItemId,
    ) -> Result<(), StoreError> {
        let deleted =
            sqlx::query("DELETE FROM cart_items WHERE id = ? AND CAST(user_id AS TEXT) = ?")
                .bind(item_id.as_i64())
                .bind(user_id.as_str())
                .execute(&self.pool)
                .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn clear_cart(&self, user_id: &UserId) -> Result<usize, StoreError> {
        let deleted = sqlx::query("DELETE FROM cart_items WHERE CAST(user_id AS TEXT) = ?")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(deleted.rows_affected()).unwrap_or(usize::MAX))
    }

    async fn place_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO orders (id, ack, user_id, phone, address, total, items, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.as_str())
        .bind(&order.ack)
        .bind(order.user_id.as_str())
        .bind(&order.phone)
        .bind(&order.address)
        .bind(order.total.to_f64())
        .bind(serde_json::to_string(&order.items)?)
        .bind(format_timestamp(order.created_at))
        .execute(&mut *tx)
        .await;

        match inserted {
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
            }
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }

        sqlx::query("DELETE FROM cart_items WHERE CAST(user_id AS TEXT) = ?")
            .bind(order.user_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_orders(&self, user_id: &UserId) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "{ORDER_SELECT} WHERE CAST(user_id AS TEXT) = ? ORDER BY created_at DESC"
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .into_iter()
            .map(Order::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Order, StoreError> {
        let row: OrderRow = sqlx::query_as(&format!("{ORDER_SELECT} WHERE CAST(id AS TEXT) = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }
}
