//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro for integer row ids and `define_key!` for string
//! keys. Keeping them distinct types prevents accidentally passing a cart line
//! id where a book id is expected.

/// Macro to define a type-safe integer ID wrapper.
///
/// Creates a newtype wrapper around `i64` with:
/// - `Serialize` with `#[serde(transparent)]`
/// - `Deserialize` that also accepts numeric strings (older stores keep ids as text)
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_i64()`
/// - `From<i64>`, `Into<i64>` and `FromStr`
///
/// # Example
///
/// ```rust
/// # use bookshelf_core::define_id;
/// define_id!(ShelfId);
/// define_id!(RowId);
///
/// let shelf = ShelfId::new(1);
/// let row = RowId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: ShelfId = row;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Create a new ID from an i64 value.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Get the underlying i64 value.
            #[must_use]
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::core::num::ParseIntError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                $crate::serde_helpers::int_or_numeric_string(deserializer).map(Self)
            }
        }
    };
}

/// Macro to define a type-safe string key wrapper.
///
/// Creates a newtype wrapper around `String` that serializes transparently and
/// deserializes from either a string or an integer, normalising to a string.
///
/// # Example
///
/// ```rust
/// # use bookshelf_core::define_key;
/// define_key!(Isbn);
///
/// let isbn: Isbn = serde_json::from_str("9780131103627").unwrap();
/// assert_eq!(isbn.as_str(), "9780131103627");
/// ```
#[macro_export]
macro_rules! define_key {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new key.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Returns the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the key and returns its inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the key is empty or whitespace only.
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                $crate::serde_helpers::string_or_number(deserializer).map(Self)
            }
        }
    };
}

// Integer row ids
define_id!(CategoryId);
define_id!(CartItemId);

// String keys
define_key!(BookId);
define_key!(UserId);
define_key!(OrderId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_id_accepts_numeric_string() {
        let id: CategoryId = serde_json::from_str("\"7\"").unwrap();
        assert_eq!(id, CategoryId::new(7));

        let id: CategoryId = serde_json::from_str("7").unwrap();
        assert_eq!(id.as_i64(), 7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }

    #[test]
    fn test_integer_id_rejects_text() {
        let result: Result<CartItemId, _> = serde_json::from_str("\"ci-123\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_key_accepts_number() {
        let id: BookId = serde_json::from_str("42").unwrap();
        assert_eq!(id.as_str(), "42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
    }

    #[test]
    fn test_key_blank() {
        assert!(UserId::new("  ").is_blank());
        assert!(!UserId::new("u-1").is_blank());
    }

    #[test]
    fn test_id_from_str() {
        assert_eq!(" 12 ".parse::<CartItemId>().unwrap(), CartItemId::new(12));
        assert!("x".parse::<CartItemId>().is_err());
    }
}
