//! Entity codecs: record ⇄ document translation.
//!
//! # Responsibility
//! - Encode records into backend documents and decode them back.
//! - Route identity-valued fields through an [`IdentityStrategy`].
//! - Give repositories uniform access to a record's string id.
//!
//! # Invariants
//! - `decode(encode(r)) == r` for every populated field.
//! - Encoding omits absent optionals and empty collections.
//! - Codecs validate shape only, never domain rules.

mod author;
mod book;
mod category;
mod member;
mod publisher;

pub use author::AuthorCodec;
pub use book::BookCodec;
pub use category::CategoryCodec;
pub use member::MemberCodec;
pub use publisher::PublisherCodec;

use crate::document::{Document, Value};
use crate::identity::IdentityStrategy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug)]
pub enum CodecError {
    InvalidType {
        entity: &'static str,
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    MalformedId {
        entity: &'static str,
        field: String,
        found: &'static str,
    },
    /// Serialization failure of a directly-serialized record.
    Serde(serde_json::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidType {
                entity,
                field,
                expected,
                found,
            } => write!(
                f,
                "{entity} field `{field}` should be {expected}, found {found}"
            ),
            Self::MalformedId {
                entity,
                field,
                found,
            } => write!(f, "{entity} identity field `{field}` holds a {found}"),
            Self::Serde(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serde(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// Record with an optional string identity.
pub trait Record {
    /// Current id; `None` before first persistence. Empty ids count as absent.
    fn record_id(&self) -> Option<&str>;
    fn set_record_id(&mut self, id: Option<String>);
}

/// Reads and writes the string id of a `T`.
pub trait IdentityAccessor<T> {
    fn id<'r>(&self, record: &'r T) -> Option<&'r str>;
    fn set_id(&self, record: &mut T, id: String);
}

/// Accessor for any [`Record`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordIdentity;

impl<T: Record> IdentityAccessor<T> for RecordIdentity {
    fn id<'r>(&self, record: &'r T) -> Option<&'r str> {
        record.record_id()
    }

    fn set_id(&self, record: &mut T, id: String) {
        record.set_record_id(Some(id));
    }
}

/// Encode/decode pair between a record type and a [`Document`].
pub trait Codec<T> {
    fn encode(&self, record: &T, identity: &dyn IdentityStrategy) -> CodecResult<Document>;
    fn decode(&self, document: &Document, identity: &dyn IdentityStrategy) -> CodecResult<T>;
}

/// Record type with a default collection and document codec.
pub trait LibraryEntity: Record + Serialize + DeserializeOwned + Clone {
    const COLLECTION: &'static str;
    type Codec: Codec<Self> + Default;
}

/// Typed field reader over a document being decoded.
pub(crate) struct Fields<'d> {
    entity: &'static str,
    document: &'d Document,
}

impl<'d> Fields<'d> {
    pub(crate) fn new(entity: &'static str, document: &'d Document) -> Self {
        Self { entity, document }
    }

    fn present(&self, field: &str) -> Option<&'d Value> {
        self.document.get(field).filter(|value| !value.is_null())
    }

    fn invalid(&self, field: &str, expected: &'static str, found: &Value) -> CodecError {
        CodecError::InvalidType {
            entity: self.entity,
            field: field.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub(crate) fn string(&self, field: &str) -> CodecResult<Option<String>> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.clone())),
            Some(other) => Err(self.invalid(field, "a string", other)),
        }
    }

    pub(crate) fn string_or_default(&self, field: &str) -> CodecResult<String> {
        Ok(self.string(field)?.unwrap_or_default())
    }

    pub(crate) fn i64(&self, field: &str) -> CodecResult<Option<i64>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => value
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.invalid(field, "an integer", value)),
        }
    }

    pub(crate) fn i32(&self, field: &str) -> CodecResult<i32> {
        match self.i64(field)? {
            None => Ok(0),
            Some(number) => i32::try_from(number).map_err(|_| CodecError::InvalidType {
                entity: self.entity,
                field: field.to_string(),
                expected: "a 32-bit integer",
                found: "int",
            }),
        }
    }

    pub(crate) fn bool(&self, field: &str) -> CodecResult<bool> {
        match self.present(field) {
            None => Ok(false),
            Some(Value::Bool(flag)) => Ok(*flag),
            Some(other) => Err(self.invalid(field, "a bool", other)),
        }
    }

    /// Identity-valued field. Nested documents and arrays are malformed ids.
    pub(crate) fn id(
        &self,
        field: &str,
        identity: &dyn IdentityStrategy,
    ) -> CodecResult<Option<String>> {
        match self.present(field) {
            None => Ok(None),
            Some(value) => native_to_id(self.entity, field, value, identity).map(Some),
        }
    }

    pub(crate) fn id_list(
        &self,
        field: &str,
        identity: &dyn IdentityStrategy,
    ) -> CodecResult<Vec<String>> {
        self.array(field)?
            .iter()
            .map(|value| native_to_id(self.entity, field, value, identity))
            .collect()
    }

    pub(crate) fn document(&self, field: &str) -> CodecResult<Option<&'d Document>> {
        match self.present(field) {
            None => Ok(None),
            Some(Value::Document(doc)) => Ok(Some(doc)),
            Some(other) => Err(self.invalid(field, "a document", other)),
        }
    }

    /// Absent and null arrays read as empty.
    pub(crate) fn array(&self, field: &str) -> CodecResult<&'d [Value]> {
        match self.present(field) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(self.invalid(field, "an array", other)),
        }
    }

    pub(crate) fn string_list(&self, field: &str) -> CodecResult<Vec<String>> {
        self.array(field)?
            .iter()
            .map(|value| match value {
                Value::String(text) => Ok(text.clone()),
                other => Err(self.invalid(field, "a list of strings", other)),
            })
            .collect()
    }

    pub(crate) fn documents(&self, field: &str) -> CodecResult<Vec<&'d Document>> {
        self.array(field)?
            .iter()
            .map(|value| match value {
                Value::Document(doc) => Ok(doc),
                other => Err(self.invalid(field, "a list of documents", other)),
            })
            .collect()
    }
}

fn native_to_id(
    entity: &'static str,
    field: &str,
    value: &Value,
    identity: &dyn IdentityStrategy,
) -> CodecResult<String> {
    match value {
        Value::Document(_) | Value::Array(_) => Err(CodecError::MalformedId {
            entity,
            field: field.to_string(),
            found: value.type_name(),
        }),
        scalar => Ok(identity.from_native(scalar)),
    }
}

pub(crate) fn put_id(
    document: &mut Document,
    field: &str,
    id: Option<&str>,
    identity: &dyn IdentityStrategy,
) {
    if let Some(id) = id {
        document.insert(field, identity.to_native(id));
    }
}

pub(crate) fn put_opt<V: Into<Value>>(document: &mut Document, field: &str, value: Option<V>) {
    if let Some(value) = value {
        document.insert(field, value);
    }
}

pub(crate) fn put_strings(document: &mut Document, field: &str, values: &[String]) {
    if !values.is_empty() {
        document.insert(field, Value::Array(values.iter().map(Value::from).collect()));
    }
}
