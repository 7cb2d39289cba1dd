//! Document model shared by the diffing and tailing subsystems.
//!
//! A document is a flat mapping from field name to JSON value, plus one
//! identity field held outside the map. The identity is assigned by the
//! external data set, is globally unique, and never changes for the
//! lifetime of the document; everything else is mutable payload.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, immutable document identity.
///
/// # Examples
///
/// ```
/// use livetail::DocId;
///
/// let id = DocId::from("user-17");
/// assert_eq!(id.as_str(), "user-17");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Creates a document id from anything string-like.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DocId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field payload of a document. The identity field is not duplicated here.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// A field-level delta between two versions of a document.
///
/// A key mapped to `Some(value)` is set to that value; a key mapped to
/// `None` is unset (removed). Fields not mentioned are untouched.
pub type FieldDelta = BTreeMap<String, Option<serde_json::Value>>;

/// A document: identity plus field payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identity.
    pub id: DocId,
    /// Field payload.
    pub fields: Fields,
}

impl Document {
    /// Creates a document with no fields.
    #[must_use]
    pub fn new(id: impl Into<DocId>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Looks up a field value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}

/// Applies a [`FieldDelta`] to a field map in place.
///
/// Present keys are set, keys marked unset are deleted. Used by observers
/// maintaining a local mirrored cache of a query result.
///
/// # Examples
///
/// ```
/// use livetail::{apply_changes, FieldDelta, Fields};
///
/// let mut fields = Fields::new();
/// fields.insert("a".to_string(), 1.into());
/// fields.insert("b".to_string(), 2.into());
///
/// let mut delta = FieldDelta::new();
/// delta.insert("a".to_string(), Some(3.into()));
/// delta.insert("b".to_string(), None);
///
/// apply_changes(&mut fields, &delta);
/// assert_eq!(fields.get("a"), Some(&serde_json::json!(3)));
/// assert!(!fields.contains_key("b"));
/// ```
pub fn apply_changes(fields: &mut Fields, delta: &FieldDelta) {
    for (name, value) in delta {
        match value {
            Some(value) => {
                fields.insert(name.clone(), value.clone());
            }
            None => {
                fields.remove(name);
            }
        }
    }
}
