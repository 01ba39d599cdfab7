//! Schemaless documents and identifiers.
//!
//! A [`Document`] is a map of field name to JSON [`Value`]. There is
//! no fixed schema: the only fields this crate gives meaning to are
//! [`ID_FIELD`], [`CREATED_AT_FIELD`] and [`UPDATED_AT_FIELD`].
//!
//! Field lookups accept dotted paths (`venue.city`) that walk nested objects.

use serde::{Deserialize, Serialize};
use serde_json::Map;
use std::fmt;

pub use serde_json::Value;

/// Field carrying the store-assigned identifier on returned documents.
pub const ID_FIELD: &str = "id";

/// Field stamped once when a document is first written.
pub const CREATED_AT_FIELD: &str = "created_at";

/// Field stamped on every write.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Identifier of a document within a collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract an identifier from a JSON value.
    ///
    /// Non-empty strings are taken as-is and integers are rendered in
    /// decimal. Anything else yields `None`.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A schemaless record: field name to JSON value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Get a top-level field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Resolve a dotted path (`a.b.c`) through nested objects.
    ///
    /// A path without dots is a plain top-level lookup.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Set a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Whether a top-level field is present.
    #[must_use]
    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over top-level fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The identifier carried in the [`ID_FIELD`], if it is usable as one.
    #[must_use]
    pub fn id(&self) -> Option<DocumentId> {
        self.get(ID_FIELD).and_then(DocumentId::from_value)
    }

    /// Shallow merge: every top-level field of `patch` overwrites the same
    /// field here; fields absent from `patch` are left untouched.
    pub fn merge(&mut self, patch: &Self) {
        for (field, value) in &patch.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Keep only the listed top-level fields (plus [`ID_FIELD`]).
    #[must_use]
    pub fn project(mut self, fields: &[String]) -> Self {
        self.0
            .retain(|field, _| field == ID_FIELD || fields.iter().any(|f| f == field));
        self
    }

    /// Borrow the underlying JSON map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the document, returning the underlying JSON map.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Self::Object(doc.0)
    }
}

impl TryFrom<Value> for Document {
    type Error = Value;

    /// Only JSON objects are documents; any other value is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A document as held by a driver: its identifier plus its stored fields.
///
/// The stored fields may or may not repeat the identifier; use
/// [`StoredDocument::into_document`] to get a document annotated with it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned identifier.
    pub id: DocumentId,
    /// Stored fields.
    pub data: Document,
}

impl StoredDocument {
    /// Create a stored document.
    #[must_use]
    pub const fn new(id: DocumentId, data: Document) -> Self {
        Self { id, data }
    }

    /// Flatten into a [`Document`] whose [`ID_FIELD`] is the store identifier.
    #[must_use]
    pub fn into_document(self) -> Document {
        let mut data = self.data;
        data.insert(ID_FIELD, self.id.0);
        data
    }
}

/// Build a [`Document`] from a `serde_json::json!`-style object literal.
///
/// Only a braced object literal is accepted:
///
/// ```
/// use docquery_core::doc;
///
/// let d = doc!({ "name": "A", "price": 10 });
/// assert_eq!(d.len(), 2);
/// ```
///
/// Anything else is a compile error. Use `Document::try_from` for JSON
/// values whose shape is only known at runtime.
///
/// ```compile_fail
/// use docquery_core::doc;
///
/// let d = doc!([1, 2]);
/// ```
#[macro_export]
macro_rules! doc {
    ({ $($body:tt)* }) => {
        $crate::document::Document::try_from($crate::serde_json::json!({ $($body)* })).unwrap_or_default()
    };
}
