//! User records, partial updates and equality filters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::UserId;
use crate::serde_helpers::{lenient_string, object_or_empty};

/// A registered user.
///
/// Fields the store does not know about are kept in `extra` and written back
/// unchanged, so both storage engines return the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    /// Stored in clear text.
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub settings: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Shallow-merge `patch` into the settings object.
    pub fn merge_settings(&mut self, patch: Map<String, Value>) {
        self.settings.extend(patch);
    }

    /// Textual value of a top-level field, as used by [`UserFilter`].
    ///
    /// Returns `None` for fields the record does not carry.
    #[must_use]
    pub fn field_text(&self, key: &str) -> Option<String> {
        match key {
            "id" => Some(self.id.to_string()),
            "name" => Some(self.name.clone()),
            "email" => Some(self.email.clone()),
            "phone" => Some(self.phone.clone()),
            "password" => Some(self.password.clone()),
            "address" => Some(self.address.clone()),
            "settings" => Some(Value::Object(self.settings.clone()).to_string()),
            other => self.extra.get(other).map(value_text),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Body of `POST /users`: a user whose id may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDraft {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "object_or_empty")]
    pub settings: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserDraft {
    /// Turn the draft into a user, calling `assign_id` when no usable id was
    /// supplied.
    pub fn into_user(self, assign_id: impl FnOnce() -> UserId) -> User {
        let id = self
            .id
            .filter(|id| !id.is_blank())
            .unwrap_or_else(assign_id);

        User {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            password: self.password,
            address: self.address,
            settings: self.settings,
            extra: self.extra,
        }
    }
}

/// The patch produced a record that is not a valid user.
#[derive(thiserror::Error, Debug)]
#[error("invalid user fields: {0}")]
pub struct UserPatchError(#[from] serde_json::Error);

/// Arbitrary field merge for `PATCH /users/:id`.
///
/// Every key overwrites the field of the same name except `id`, which is
/// ignored so a user cannot be re-keyed, and `settings`, whose object is
/// shallow-merged into the stored one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserPatch(Map<String, Value>);

impl UserPatch {
    #[must_use]
    pub const fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Merge the patch over `user` and return the result.
    ///
    /// # Errors
    ///
    /// Returns `UserPatchError` if a known field receives a value of the wrong
    /// shape (for example an array for `name`).
    pub fn apply(&self, user: &User) -> Result<User, UserPatchError> {
        let mut value = serde_json::to_value(user)?;
        let mut settings = None;
        if let Value::Object(record) = &mut value {
            for (key, field) in &self.0 {
                match (key.as_str(), field) {
                    ("id", _) => {}
                    ("settings", Value::Object(patch)) => settings = Some(patch.clone()),
                    _ => {
                        record.insert(key.clone(), field.clone());
                    }
                }
            }
        }

        let mut updated: User = serde_json::from_value(value)?;
        if let Some(patch) = settings {
            updated.merge_settings(patch);
        }
        Ok(updated)
    }
}

/// Conjunction of `field == value` predicates from a query string.
///
/// Values are compared in their textual form. A user lacking a filtered field
/// never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter(Vec<(String, String)>);

impl UserFilter {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self(pairs.into_iter().collect())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn matches(&self, user: &User) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| user.field_text(key).is_some_and(|actual| actual == *expected))
    }
}
