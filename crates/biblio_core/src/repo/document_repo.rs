//! Repository over the document backend.
//!
//! # Responsibility
//! - Compose a [`Codec`] and an [`IdentityAccessor`] into [`Repository`] CRUD.
//! - Convert string ids to native `ObjectId`s through [`OpaqueIdentity`].
//!
//! # Invariants
//! - `update` reports `true` only when stored content actually changed.
//! - Ids minted by the store are read back and returned as 24-char hex.

use super::{RepoError, RepoResult, Repository};
use crate::codec::{Codec, IdentityAccessor, LibraryEntity, RecordIdentity};
use crate::document::{Document, Value, ID_FIELD};
use crate::identity::{IdentityStrategy, OpaqueIdentity};
use crate::query::{Filter, Query, Update};
use crate::store::{Collection, DocumentStore};
use log::{debug, error};
use std::marker::PhantomData;
use std::time::Instant;

/// [`Repository`] storing `T` as documents in one collection.
pub struct DocumentRepository<T, C, A = RecordIdentity> {
    collection: Collection,
    codec: C,
    accessor: A,
    identity: OpaqueIdentity,
    _record: PhantomData<fn() -> T>,
}

impl<T, C, A> DocumentRepository<T, C, A>
where
    C: Codec<T>,
    A: IdentityAccessor<T>,
{
    pub fn new(store: &DocumentStore, collection: impl Into<String>, codec: C, accessor: A) -> Self {
        Self {
            collection: store.collection(collection),
            codec,
            accessor,
            identity: OpaqueIdentity,
            _record: PhantomData,
        }
    }

    fn run<R>(&self, op: &'static str, action: impl FnOnce() -> RepoResult<R>) -> RepoResult<R> {
        let started_at = Instant::now();
        let result = action();
        match &result {
            Ok(_) => debug!(
                "event=repo_op module=repo status=ok backend=document op={op} collection={} duration_ms={}",
                self.collection.name(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=repo_op module=repo status=error backend=document op={op} collection={} error_code={} error={err}",
                self.collection.name(),
                err.code()
            ),
        }
        result
    }

    fn encode(&self, record: &T) -> RepoResult<Document> {
        self.codec
            .encode(record, &self.identity)
            .map_err(|source| RepoError::Encode {
                collection: self.collection.name().to_string(),
                source,
            })
    }

    fn decode(&self, document: &Document) -> RepoResult<T> {
        self.codec
            .decode(document, &self.identity)
            .map_err(|source| RepoError::Decode {
                collection: self.collection.name().to_string(),
                source,
            })
    }

    fn delete_native(&self, id: &str) -> RepoResult<bool> {
        let deleted = self.collection.delete_one(&self.identity.to_native(id))?;
        Ok(deleted.deleted_count > 0)
    }
}

impl<T> DocumentRepository<T, T::Codec, RecordIdentity>
where
    T: LibraryEntity,
{
    /// Repository over the entity's default collection and codec.
    pub fn for_entity(store: &DocumentStore) -> Self {
        Self::new(store, T::COLLECTION, T::Codec::default(), RecordIdentity)
    }
}

impl<T, C, A> Repository<T> for DocumentRepository<T, C, A>
where
    C: Codec<T>,
    A: IdentityAccessor<T>,
{
    fn collection_name(&self) -> &str {
        self.collection.name()
    }

    fn native_id(&self, id: &str) -> Value {
        self.identity.to_native(id)
    }

    fn insert_one(&self, record: &T) -> RepoResult<String> {
        self.run("insert_one", || {
            let document = self.encode(record)?;
            let inserted = self.collection.insert_one(document)?;
            Ok(self.identity.from_native(&inserted.inserted_id))
        })
    }

    fn insert_many(&self, records: &[T]) -> RepoResult<Vec<String>> {
        self.run("insert_many", || {
            let documents = records
                .iter()
                .map(|record| self.encode(record))
                .collect::<RepoResult<Vec<_>>>()?;
            let ids = self.collection.insert_many(documents)?;
            Ok(ids
                .iter()
                .map(|id| self.identity.from_native(id))
                .collect())
        })
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<T>> {
        self.run("find_by_id", || {
            self.collection
                .find_by_id(&self.identity.to_native(id))?
                .map(|document| self.decode(&document))
                .transpose()
        })
    }

    fn find(&self, query: &Query) -> RepoResult<Vec<T>> {
        self.run("find", || {
            self.collection
                .find(query)?
                .iter()
                .map(|document| self.decode(document))
                .collect()
        })
    }

    fn count(&self, filter: &Filter) -> RepoResult<u64> {
        self.run("count", || Ok(self.collection.count_documents(filter)?))
    }

    fn update(&self, record: &T) -> RepoResult<bool> {
        let Some(id) = self.accessor.id(record) else {
            return Ok(false);
        };
        self.run("update", || {
            let native = self.identity.to_native(id);
            let mut document = self.encode(record)?;
            document.remove(ID_FIELD);
            let result = self.collection.replace_one(&native, document)?;
            Ok(result.modified_count > 0)
        })
    }

    fn update_many(&self, filter: &Filter, update: &Update) -> RepoResult<bool> {
        self.run("update_many", || {
            let result = self.collection.update_many(filter, update)?;
            Ok(result.modified_count > 0)
        })
    }

    fn update_field(&self, id: &str, field: &str, value: Value) -> RepoResult<bool> {
        self.run("update_field", || {
            let filter = Filter::eq(ID_FIELD, self.identity.to_native(id));
            let result = self
                .collection
                .update_many(&filter, &Update::new().set(field, value))?;
            Ok(result.modified_count > 0)
        })
    }

    fn delete(&self, record: &T) -> RepoResult<bool> {
        let Some(id) = self.accessor.id(record) else {
            return Ok(false);
        };
        self.run("delete", || self.delete_native(id))
    }

    fn delete_by_id(&self, id: &str) -> RepoResult<bool> {
        self.run("delete_by_id", || self.delete_native(id))
    }

    fn delete_many(&self, filter: &Filter) -> RepoResult<bool> {
        self.run("delete_many", || {
            Ok(self.collection.delete_many(filter)?.deleted_count > 0)
        })
    }

    fn delete_all(&self) -> RepoResult<bool> {
        self.run("delete_all", || {
            self.collection.delete_many(&Filter::All)?;
            Ok(true)
        })
    }

    fn drop_collection(&self) -> RepoResult<()> {
        self.run("drop_collection", || Ok(self.collection.drop_collection()?))
    }
}
