//! Catalog types: books, categories, and the books version stamp.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::{BookId, CategoryId};
use super::price::Price;
use crate::serde_helpers::{flexible_bool, flexible_bool_opt};

/// A book in the catalog.
///
/// `out_of_stock` is always a bool on the wire even when the store keeps it
/// as `0/1`, and `categories` is the resolved list of category ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub price: Price,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub pdf_url: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub out_of_stock: bool,
    #[serde(default, deserialize_with = "category_ids")]
    pub categories: Vec<CategoryId>,
}

/// Read a category list, skipping entries that are not integer ids.
///
/// A hand-edited document with one bad entry still loads; the entry is
/// logged and dropped.
fn category_ids<'de, D>(deserializer: D) -> Result<Vec<CategoryId>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = <Option<Vec<Value>> as Deserialize>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            let id = match &entry {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            if id.is_none() {
                tracing::warn!(entry = %entry, "skipping invalid category id");
            }
            id.map(CategoryId::new)
        })
        .collect())
}

impl Book {
    /// Sort and de-duplicate the category list.
    ///
    /// Both storage engines return books through this so the list order
    /// does not depend on insertion order.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.categories.sort_unstable();
        self.categories.dedup();
        self
    }

    /// Apply the recognised fields of a patch.
    pub fn apply(&mut self, patch: &BookPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(author) = &patch.author {
            self.author.clone_from(author);
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(image_url) = &patch.image_url {
            self.image_url.clone_from(image_url);
        }
        if let Some(pdf_url) = &patch.pdf_url {
            self.pdf_url.clone_from(pdf_url);
        }
        if let Some(out_of_stock) = patch.out_of_stock {
            self.out_of_stock = out_of_stock;
        }
    }
}

/// Partial update of a book.
///
/// Only `name`, `author`, `price`, `image_url`, `pdf_url` and `out_of_stock`
/// are recognised; any other field in the payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(
        default,
        deserialize_with = "flexible_bool_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub out_of_stock: Option<bool>,
}

impl BookPatch {
    /// Patch that only toggles the stock flag.
    #[must_use]
    pub fn stock(out_of_stock: bool) -> Self {
        Self {
            out_of_stock: Some(out_of_stock),
            ..Self::default()
        }
    }

    /// Whether the patch carries no recognised field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.author.is_none()
            && self.price.is_none()
            && self.image_url.is_none()
            && self.pdf_url.is_none()
            && self.out_of_stock.is_none()
    }
}

/// A book category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    #[serde(default)]
    pub name: String,
}

/// Response body of `GET /booksVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooksVersion {
    pub books_version: i64,
}

/// Error parsing a `?category=` filter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid category id: {0:?}")]
pub struct CategoryFilterError(pub String);

/// A set of category ids with OR semantics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryFilter(BTreeSet<CategoryId>);

impl CategoryFilter {
    /// Parse a comma-separated list such as `"1, 4,9"`.
    ///
    /// Returns `Ok(None)` when the list is empty, meaning "no filter".
    ///
    /// # Errors
    ///
    /// Returns `CategoryFilterError` if an entry is not an integer id.
    pub fn parse(raw: &str) -> Result<Option<Self>, CategoryFilterError> {
        let ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<CategoryId>()
                    .map_err(|_| CategoryFilterError(s.to_owned()))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok((!ids.is_empty()).then_some(Self(ids)))
    }

    /// Whether the book belongs to at least one of the filter's categories.
    #[must_use]
    pub fn matches(&self, book: &Book) -> bool {
        book.categories.iter().any(|c| self.0.contains(c))
    }

    /// The category ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = CategoryId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<CategoryId> for CategoryFilter {
    fn from_iter<T: IntoIterator<Item = CategoryId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn book(id: &str, categories: &[i64]) -> Book {
        Book {
            id: BookId::new(id),
            name: format!("Book {id}"),
            author: "Anon".to_string(),
            price: Price::from_f64(100.0).unwrap(),
            image_url: String::new(),
            pdf_url: String::new(),
            out_of_stock: false,
            categories: categories.iter().copied().map(CategoryId::new).collect(),
        }
    }

    #[test]
    fn test_book_reads_legacy_shapes() {
        let raw = json!({
            "id": 3,
            "name": "Dune",
            "price": "450",
            "out_of_stock": 1,
            "categories": ["2", 1, 2]
        });
        let book: Book = serde_json::from_value(raw).unwrap();
        let book = book.normalized();

        assert_eq!(book.id.as_str(), "3");
        assert!(book.out_of_stock);
        assert_eq!(book.categories, vec![CategoryId::new(1), CategoryId::new(2)]);
        assert_eq!(book.author, "");
    }

    #[test]
    fn test_book_skips_invalid_category_ids() {
        let raw = json!({
            "id": "b9",
            "categories": [1, "fiction", " 4 ", null, 2.5, {"id": 3}]
        });
        let book: Book = serde_json::from_value(raw).unwrap();
        assert_eq!(book.categories, vec![CategoryId::new(1), CategoryId::new(4)]);

        let book: Book = serde_json::from_value(json!({"id": "b10", "categories": null})).unwrap();
        assert!(book.categories.is_empty());
    }

    #[test]
    fn test_book_serializes_flag_as_bool() {
        let value = serde_json::to_value(book("b1", &[1])).unwrap();
        assert_eq!(value["out_of_stock"], json!(false));
        assert_eq!(value["categories"], json!([1]));
        assert_eq!(value["id"], json!("b1"));
    }

    #[test]
    fn test_patch_ignores_unknown_fields() {
        let patch: BookPatch =
            serde_json::from_value(json!({"id": "other", "categories": [9]})).unwrap();
        assert!(patch.is_empty());

        let patch: BookPatch = serde_json::from_value(json!({"out_of_stock": true})).unwrap();
        assert_eq!(patch, BookPatch::stock(true));
    }

    #[test]
    fn test_apply_patch_touches_only_given_fields() {
        let mut b = book("b1", &[1]);
        b.apply(&BookPatch {
            price: Some("120.5".parse().unwrap()),
            out_of_stock: Some(true),
            ..BookPatch::default()
        });

        assert_eq!(b.name, "Book b1");
        assert_eq!(b.price, "120.5".parse().unwrap());
        assert!(b.out_of_stock);
    }

    #[test]
    fn test_category_filter_or_semantics() {
        let filter = CategoryFilter::parse("1, 3").unwrap().unwrap();
        assert!(filter.matches(&book("a", &[1])));
        assert!(filter.matches(&book("b", &[2, 3])));
        assert!(!filter.matches(&book("c", &[2])));
        assert!(!filter.matches(&book("d", &[])));
    }

    #[test]
    fn test_category_filter_parse_edges() {
        assert_eq!(CategoryFilter::parse("").unwrap(), None);
        assert_eq!(CategoryFilter::parse(" , ").unwrap(), None);
        assert_eq!(
            CategoryFilter::parse("1,x"),
            Err(CategoryFilterError("x".to_string()))
        );
    }
}
