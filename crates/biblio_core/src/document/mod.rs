//! Ordered document model shared by both backends.
//!
//! # Responsibility
//! - Represent a backend document as an ordered field map of typed values.
//! - Provide dotted-path access used by queries, projections and patches.
//! - Convert to and from the extended JSON text persisted by the stores.
//!
//! # Invariants
//! - Field order is insertion order; replacing a field keeps its position.
//! - `ObjectId` values survive a JSON round trip as `{"$oid": "<hex>"}`.

mod object_id;
mod value;

pub use object_id::{ObjectId, ObjectIdError};
pub use value::Value;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field that carries the identity of a document in the document backend.
pub const ID_FIELD: &str = "_id";

/// Errors raised by path manipulation and JSON parsing.
#[derive(Debug)]
pub enum DocumentError {
    /// Path is empty or contains an empty segment (`a..b`).
    InvalidPath(String),
    /// Path walks through a value that cannot hold fields.
    PathConflict { path: String, found: &'static str },
    /// Path indexes past the end of an array.
    IndexOutOfBounds { path: String, index: usize },
    /// JSON text parsed, but the top-level value is not an object.
    NotAnObject(&'static str),
    Json(serde_json::Error),
}

impl Display for DocumentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid field path `{path}`"),
            Self::PathConflict { path, found } => {
                write!(f, "field path `{path}` traverses a {found} value")
            }
            Self::IndexOutOfBounds { path, index } => {
                write!(f, "field path `{path}` indexes past array end at {index}")
            }
            Self::NotAnObject(found) => write!(f, "expected a JSON object, found {found}"),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DocumentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DocumentError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Ordered mapping of field name to [`Value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, convenient for literal documents.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a field. Replaced fields keep their position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Inserts a field at the front, removing any previous occurrence.
    pub fn prepend(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let previous = self.remove(&key);
        self.entries.insert(0, (key, value.into()));
        previous
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(existing, _)| existing == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Resolves a dotted path through nested documents and array indexes.
    ///
    /// Does not fan out over arrays; query evaluation handles that.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets the value at a dotted path, creating missing intermediate
    /// documents. Returns the replaced value, if any.
    pub fn set_path(
        &mut self,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, DocumentError> {
        let segments = split_path(path)?;
        let (head, rest) = segments
            .split_first()
            .ok_or_else(|| DocumentError::InvalidPath(path.to_string()))?;
        if rest.is_empty() {
            return Ok(self.insert(*head, value));
        }
        if !self.contains_key(head) {
            self.insert(*head, Document::new());
        }
        match self.get_mut(head) {
            Some(child) => set_in_value(child, rest, value.into(), path),
            None => Err(DocumentError::InvalidPath(path.to_string())),
        }
    }

    /// Removes the value at a dotted path. Array elements are nulled
    /// rather than removed so sibling positions stay stable.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        let (head, rest) = segments.split_first()?;
        if rest.is_empty() {
            return self.remove(head);
        }
        remove_in_value(self.get_mut(head)?, rest)
    }

    /// Extended JSON form of this document.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, DocumentError> {
        match Value::from_json(value) {
            Value::Document(document) => Ok(document),
            other => Err(DocumentError::NotAnObject(other.type_name())),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, DocumentError> {
        Self::from_json(serde_json::from_str(text)?)
    }

    pub(crate) fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter()
            .map(|(key, value)| (key, Value::from_json(value)))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut document = Document::new();
        for (key, value) in iter {
            document.insert(key, value);
        }
        document
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

pub(crate) fn split_path(path: &str) -> Result<Vec<&str>, DocumentError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(DocumentError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn set_in_value(
    target: &mut Value,
    segments: &[&str],
    value: Value,
    path: &str,
) -> Result<Option<Value>, DocumentError> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(Some(std::mem::replace(target, value)));
    };
    match target {
        Value::Document(doc) => {
            if rest.is_empty() {
                return Ok(doc.insert(*head, value));
            }
            if !doc.contains_key(head) {
                doc.insert(*head, Document::new());
            }
            match doc.get_mut(head) {
                Some(child) => set_in_value(child, rest, value, path),
                None => Err(DocumentError::InvalidPath(path.to_string())),
            }
        }
        Value::Array(items) => {
            let index = head
                .parse::<usize>()
                .map_err(|_| DocumentError::PathConflict {
                    path: path.to_string(),
                    found: "array",
                })?;
            let child = items
                .get_mut(index)
                .ok_or_else(|| DocumentError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                })?;
            set_in_value(child, rest, value, path)
        }
        other => Err(DocumentError::PathConflict {
            path: path.to_string(),
            found: other.type_name(),
        }),
    }
}

fn remove_in_value(target: &mut Value, segments: &[&str]) -> Option<Value> {
    let (head, rest) = segments.split_first()?;
    match target {
        Value::Document(doc) if rest.is_empty() => doc.remove(head),
        Value::Document(doc) => remove_in_value(doc.get_mut(head)?, rest),
        Value::Array(items) => {
            let child = items.get_mut(head.parse::<usize>().ok()?)?;
            if rest.is_empty() {
                Some(std::mem::replace(child, Value::Null))
            } else {
                remove_in_value(child, rest)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{Document, DocumentError, ObjectId, Value};

    #[test]
    fn insert_replaces_in_place_and_keeps_order() {
        let mut doc = Document::new().with("a", 1).with("b", 2).with("c", 3);
        doc.insert("b", "two");

        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(doc.get("b"), Some(&Value::from("two")));
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut doc = Document::new();
        doc.set_path("contactInfo.emergencyContact.phone", "555")
            .unwrap();

        assert_eq!(
            doc.get_path("contactInfo.emergencyContact.phone"),
            Some(&Value::from("555"))
        );
    }

    #[test]
    fn set_path_through_scalar_is_rejected() {
        let mut doc = Document::new().with("name", "Ada");
        let err = doc.set_path("name.first", "A").unwrap_err();
        assert!(matches!(err, DocumentError::PathConflict { found: "string", .. }));
    }

    #[test]
    fn remove_path_nulls_array_elements() {
        let mut doc = Document::new().with("tags", vec!["a", "b"]);
        assert_eq!(doc.remove_path("tags.0"), Some(Value::from("a")));
        assert_eq!(
            doc.get("tags"),
            Some(&Value::Array(vec![Value::Null, Value::from("b")]))
        );
    }

    #[test]
    fn json_round_trip_keeps_object_ids_and_order() {
        let id = ObjectId::new();
        let doc = Document::new()
            .with("_id", id)
            .with("zeta", 1.5)
            .with("alpha", Document::new().with("n", 3));

        let parsed = Document::from_json_str(&doc.to_json_string()).unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["_id", "zeta", "alpha"]);
    }

    #[test]
    fn from_json_rejects_non_objects() {
        let err = Document::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject("array")));
    }
}
