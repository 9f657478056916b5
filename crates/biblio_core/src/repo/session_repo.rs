//! Repository over the session backend.
//!
//! # Responsibility
//! - Run each repository operation inside one [`DocumentSession`].
//! - Serialize records with serde and key them by composite ids.
//!
//! # Invariants
//! - Every mutating operation ends with exactly one `save_changes`.
//! - `update` reports `true` for any successful replace of an existing record.

use super::{RepoError, RepoResult, Repository};
use crate::codec::{CodecError, IdentityAccessor, LibraryEntity, RecordIdentity};
use crate::document::Value;
use crate::identity::{CompositeIdentity, IdentityStrategy};
use crate::query::{Filter, Query, Update, UpdateOp};
use crate::store::{DocumentSession, SessionStore, StoredEntity, ID_PROPERTY};
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Instant;

/// [`Repository`] storing `T` as serialized entities in one collection.
pub struct SessionRepository<T, A = RecordIdentity> {
    store: SessionStore,
    collection: String,
    accessor: A,
    identity: CompositeIdentity,
    _record: PhantomData<fn() -> T>,
}

impl<T, A> SessionRepository<T, A>
where
    T: Serialize + DeserializeOwned,
    A: IdentityAccessor<T>,
{
    pub fn new(store: &SessionStore, collection: impl Into<String>, accessor: A) -> Self {
        Self {
            store: store.clone(),
            collection: collection.into(),
            accessor,
            identity: CompositeIdentity,
            _record: PhantomData,
        }
    }

    fn with_session<R>(
        &self,
        op: &'static str,
        action: impl FnOnce(&mut DocumentSession<'_>) -> RepoResult<R>,
    ) -> RepoResult<R> {
        let started_at = Instant::now();
        let result = self
            .store
            .open_session()
            .map_err(RepoError::from)
            .and_then(|mut session| action(&mut session));
        match &result {
            Ok(_) => debug!(
                "event=repo_op module=repo status=ok backend=session op={op} collection={} duration_ms={}",
                self.collection,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=repo_op module=repo status=error backend=session op={op} collection={} error_code={} error={err}",
                self.collection,
                err.code()
            ),
        }
        result
    }

    fn encode(&self, record: &T) -> RepoResult<serde_json::Value> {
        serde_json::to_value(record).map_err(|err| RepoError::Encode {
            collection: self.collection.clone(),
            source: CodecError::Serde(err),
        })
    }

    fn decode(&self, entity: StoredEntity, with_id: bool) -> RepoResult<T> {
        let mut record: T =
            serde_json::from_value(entity.body).map_err(|err| RepoError::Decode {
                collection: self.collection.clone(),
                source: CodecError::Serde(err),
            })?;
        if with_id {
            self.accessor.set_id(&mut record, entity.id);
        }
        Ok(record)
    }

    fn delete_existing(&self, session: &mut DocumentSession<'_>, id: &str) -> RepoResult<bool> {
        if !session.exists(&self.collection, id)? {
            return Ok(false);
        }
        session.delete(&self.collection, id);
        Ok(session.save_changes()?.deleted > 0)
    }

    fn delete_matching(&self, session: &mut DocumentSession<'_>, filter: &Filter) -> RepoResult<usize> {
        let ids = session.query_ids(&self.collection, filter)?;
        for id in &ids {
            session.delete(&self.collection, id);
        }
        session.save_changes()?;
        Ok(ids.len())
    }
}

impl<T> SessionRepository<T, RecordIdentity>
where
    T: LibraryEntity,
{
    /// Repository over the entity's default collection.
    pub fn for_entity(store: &SessionStore) -> Self {
        Self::new(store, T::COLLECTION, RecordIdentity)
    }
}

impl<T, A> Repository<T> for SessionRepository<T, A>
where
    T: Serialize + DeserializeOwned,
    A: IdentityAccessor<T>,
{
    fn collection_name(&self) -> &str {
        &self.collection
    }

    fn native_id(&self, id: &str) -> Value {
        self.identity.to_native(id)
    }

    fn insert_one(&self, record: &T) -> RepoResult<String> {
        let body = self.encode(record)?;
        self.with_session("insert_one", |session| {
            let id = session.store_value(&self.collection, self.accessor.id(record), body)?;
            session.save_changes()?;
            Ok(id)
        })
    }

    fn insert_many(&self, records: &[T]) -> RepoResult<Vec<String>> {
        let bodies = records
            .iter()
            .map(|record| self.encode(record))
            .collect::<RepoResult<Vec<_>>>()?;
        self.with_session("insert_many", |session| {
            let mut ids = Vec::with_capacity(bodies.len());
            for (record, body) in records.iter().zip(bodies) {
                ids.push(session.store_value(&self.collection, self.accessor.id(record), body)?);
            }
            session.save_changes()?;
            Ok(ids)
        })
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<T>> {
        self.with_session("find_by_id", |session| {
            session
                .load(&self.collection, id)?
                .map(|body| {
                    self.decode(
                        StoredEntity {
                            id: id.to_string(),
                            body,
                        },
                        true,
                    )
                })
                .transpose()
        })
    }

    fn find(&self, query: &Query) -> RepoResult<Vec<T>> {
        let with_id = query
            .projection
            .as_ref()
            .map_or(true, |projection| projection.include_id());
        self.with_session("find", |session| {
            session
                .query(&self.collection, query)?
                .into_iter()
                .map(|entity| self.decode(entity, with_id))
                .collect()
        })
    }

    fn count(&self, filter: &Filter) -> RepoResult<u64> {
        self.with_session("count", |session| {
            Ok(session.count(&self.collection, filter)?)
        })
    }

    fn update(&self, record: &T) -> RepoResult<bool> {
        let Some(id) = self.accessor.id(record) else {
            return Ok(false);
        };
        let body = self.encode(record)?;
        self.with_session("update", |session| {
            if !session.exists(&self.collection, id)? {
                return Ok(false);
            }
            session.store_value(&self.collection, Some(id), body)?;
            Ok(session.save_changes()?.stored > 0)
        })
    }

    fn update_many(&self, filter: &Filter, update: &Update) -> RepoResult<bool> {
        update
            .validate(ID_PROPERTY)
            .map_err(RepoError::InvalidQuery)?;
        self.with_session("update_many", |session| {
            let ids = session.query_ids(&self.collection, filter)?;
            for id in &ids {
                for op in update.ops() {
                    session.patch(&self.collection, id, op.clone())?;
                }
            }
            Ok(session.save_changes()?.patched > 0)
        })
    }

    fn update_field(&self, id: &str, field: &str, value: Value) -> RepoResult<bool> {
        self.with_session("update_field", |session| {
            if !session.exists(&self.collection, id)? {
                return Ok(false);
            }
            session.patch(&self.collection, id, UpdateOp::Set(field.to_string(), value))?;
            Ok(session.save_changes()?.patched > 0)
        })
    }

    fn delete(&self, record: &T) -> RepoResult<bool> {
        let Some(id) = self.accessor.id(record) else {
            return Ok(false);
        };
        self.with_session("delete", |session| self.delete_existing(session, id))
    }

    fn delete_by_id(&self, id: &str) -> RepoResult<bool> {
        self.with_session("delete_by_id", |session| self.delete_existing(session, id))
    }

    fn delete_many(&self, filter: &Filter) -> RepoResult<bool> {
        self.with_session("delete_many", |session| {
            Ok(self.delete_matching(session, filter)? > 0)
        })
    }

    fn delete_all(&self) -> RepoResult<bool> {
        self.with_session("delete_all", |session| {
            self.delete_matching(session, &Filter::All)?;
            Ok(true)
        })
    }

    fn drop_collection(&self) -> RepoResult<()> {
        self.with_session("drop_collection", |session| {
            session.drop_collection(&self.collection);
            session.save_changes()?;
            Ok(())
        })
    }
}
