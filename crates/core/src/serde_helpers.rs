//! Lenient serde helpers for loosely typed stored data.
//!
//! The flat JSON document is hand-editable and older `SQLite` files store
//! booleans as `0/1` and ids as text. These deserializers accept every shape
//! the store has historically produced and normalise it, so API responses
//! always carry the same types.

use core::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde_json::{Map, Value};

/// Deserialize a string that may have been stored as a number.
///
/// # Errors
///
/// Fails for values that are neither strings nor integers.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrNumber;

    impl Visitor<'_> for StringOrNumber {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a string or an integer")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            Ok(value.to_owned())
        }

        fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value.to_string())
        }
    }

    deserializer.deserialize_any(StringOrNumber)
}

/// Deserialize a free-text field, reading null as the empty string.
///
/// Numbers and booleans keep their textual form, so a phone number stored as
/// an integer still compares equal to the same digits given as a string.
///
/// # Errors
///
/// Fails for arrays and objects.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = <Option<Value> as serde::Deserialize>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(other) => Err(de::Error::custom(format!("expected text, found {other}"))),
    }
}

/// Deserialize an integer that may have been stored as a numeric string.
///
/// # Errors
///
/// Fails for non-numeric strings and values outside the `i64` range.
pub fn int_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct IntOrString;

    impl Visitor<'_> for IntOrString {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("an integer or a numeric string")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            i64::try_from(value).map_err(|_| E::custom(format!("integer {value} out of range")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| E::custom(format!("invalid integer id: {value:?}")))
        }
    }

    deserializer.deserialize_any(IntOrString)
}

/// Deserialize a flag stored as a bool, `0/1`, `"true"/"false"`, or null.
///
/// Null and missing values read as `false`.
///
/// # Errors
///
/// Fails for strings other than `true`, `false`, `1`, `0` and the empty string.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleBool;

    impl Visitor<'_> for FlexibleBool {
        type Value = bool;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a bool, 0/1, or \"true\"/\"false\"")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value != 0)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value != 0)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            match value.trim() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                other => Err(E::custom(format!("invalid flag: {other:?}"))),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(false)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(false)
        }
    }

    deserializer.deserialize_any(FlexibleBool)
}

/// Optional variant of [`flexible_bool`] for patch payloads.
///
/// Pair with `#[serde(default)]` so an absent field stays `None`.
///
/// # Errors
///
/// Same as [`flexible_bool`].
pub fn flexible_bool_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    flexible_bool(deserializer).map(Some)
}

/// Deserialize a JSON object, reading null or any non-object value as `{}`.
///
/// # Errors
///
/// Only fails if the input is not valid JSON.
pub fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = <Option<Value> as serde::Deserialize>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    })
}
