//! Generic repository contract and its backend implementations.
//!
//! # Responsibility
//! - Define one backend-neutral CRUD contract for every library entity.
//! - Map backend failures onto a single error taxonomy.
//!
//! # Invariants
//! - Absence is never an error: lookups yield `None`, mutations yield `false`.
//! - A failed batch may have persisted nothing; callers must not assume a subset.
//! - Repositories never retry.

mod document_repo;
mod finders;
mod session_repo;

pub use document_repo::DocumentRepository;
pub use finders::{AuthorQueries, BookQueries, CategoryQueries, MemberQueries, PublisherQueries};
pub use session_repo::SessionRepository;

use crate::codec::CodecError;
use crate::document::Value;
use crate::query::{Filter, Query, Update};
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository failure, classified by where it happened.
#[derive(Debug)]
pub enum RepoError {
    /// Backend could not be reached or acquired.
    Connectivity(StoreError),
    Encode {
        collection: String,
        source: CodecError,
    },
    Decode {
        collection: String,
        source: CodecError,
    },
    /// Backend rejected or failed the operation.
    Persistence(StoreError),
    InvalidQuery(String),
}

impl RepoError {
    /// Stable short code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Encode { .. } => "encode",
            Self::Decode { .. } => "decode",
            Self::Persistence(_) => "persistence",
            Self::InvalidQuery(_) => "invalid_query",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connectivity(err) => write!(f, "backend unreachable: {err}"),
            Self::Encode { collection, source } => {
                write!(f, "failed to encode record for `{collection}`: {source}")
            }
            Self::Decode { collection, source } => {
                write!(f, "failed to decode record from `{collection}`: {source}")
            }
            Self::Persistence(err) => write!(f, "{err}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Connectivity(err) | Self::Persistence(err) => Some(err),
            Self::Encode { source, .. } | Self::Decode { source, .. } => Some(source),
            Self::InvalidQuery(_) => None,
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidQuery(message) => Self::InvalidQuery(message),
            StoreError::Unavailable(_) | StoreError::Config(_) => Self::Connectivity(value),
            other => Self::Persistence(other),
        }
    }
}

/// CRUD contract shared by every backend.
///
/// Object safe, so callers can hold a `&dyn Repository<T>` and swap backends.
pub trait Repository<T> {
    fn collection_name(&self) -> &str;

    /// Backend-native form of `id`, for building filters on id-valued fields.
    fn native_id(&self, id: &str) -> Value;

    /// Persists `record` and returns its id, assigning one when absent.
    fn insert_one(&self, record: &T) -> RepoResult<String>;

    /// Persists all `records` atomically; ids come back in input order.
    fn insert_many(&self, records: &[T]) -> RepoResult<Vec<String>>;

    fn find_by_id(&self, id: &str) -> RepoResult<Option<T>>;

    fn find(&self, query: &Query) -> RepoResult<Vec<T>>;

    fn find_all(&self) -> RepoResult<Vec<T>> {
        self.find(&Query::all())
    }

    fn count(&self, filter: &Filter) -> RepoResult<u64>;

    /// Replaces the stored record with `record`, matched by id.
    ///
    /// Returns `false` when `record` has no id or nothing is stored under it.
    fn update(&self, record: &T) -> RepoResult<bool>;

    fn update_many(&self, filter: &Filter, update: &Update) -> RepoResult<bool>;

    /// Sets one field of the record stored under `id`.
    fn update_field(&self, id: &str, field: &str, value: Value) -> RepoResult<bool>;

    fn delete(&self, record: &T) -> RepoResult<bool>;

    fn delete_by_id(&self, id: &str) -> RepoResult<bool>;

    fn delete_many(&self, filter: &Filter) -> RepoResult<bool>;

    /// Removes every record; `true` even when the collection was empty.
    fn delete_all(&self) -> RepoResult<bool>;

    fn drop_collection(&self) -> RepoResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        let invalid: RepoError = StoreError::InvalidQuery("bad path".to_string()).into();
        assert!(matches!(invalid, RepoError::InvalidQuery(_)));

        let unavailable: RepoError = StoreError::Unavailable("poisoned".to_string()).into();
        assert_eq!(unavailable.code(), "connectivity");

        let duplicate: RepoError = StoreError::DuplicateKey {
            collection: "books".to_string(),
            key: "oid:1".to_string(),
        }
        .into();
        assert_eq!(duplicate.code(), "persistence");
        assert!(duplicate.source().is_some());
    }
}
