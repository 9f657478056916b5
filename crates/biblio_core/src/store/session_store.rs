//! Embedded session backend.
//!
//! # Responsibility
//! - Persist serialized entities addressed by composite ids.
//! - Mint ids client-side through HiLo blocks.
//! - Queue writes in a [`DocumentSession`] and flush them in one transaction.
//! - Translate filters and patches into SQLite JSON1 SQL.
//!
//! # Invariants
//! - Stored bodies never contain the `id` property; the id is the row key.
//! - Nothing is written until `save_changes`; unsaved sessions discard work.
//! - A session performs at most `max_requests_per_session` round trips.

use super::{
    collection_names, is_constraint_violation, register_collection, unregister_collection,
    SharedConnection, StoreError, StoreResult, UnitOfWork,
};
use crate::config::StoreConfig;
use crate::db::{ensure_schema_ready, open_with_config};
use crate::document::Document;
use crate::identity::HiLoIdGenerator;
use crate::query::matcher::project;
use crate::query::sql::{translate_filter, translate_patch, translate_sort};
use crate::query::{Filter, Query, UpdateOp};
use log::{debug, info, warn};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const BACKEND: &str = "session";
const REQUIRED_TABLES: [&str; 3] = ["collections", "typed_documents", "hilo"];

/// Property that carries an entity's id in its serialized form.
pub const ID_PROPERTY: &str = "id";

/// Entity body as stored, with its id split out.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub id: String,
    pub body: serde_json::Value,
}

/// What one `save_changes` call wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub stored: usize,
    pub patched: usize,
    pub deleted: usize,
}

impl SaveSummary {
    pub fn is_empty(&self) -> bool {
        self.stored == 0 && self.patched == 0 && self.deleted == 0
    }
}

#[derive(Debug)]
enum Command {
    Store {
        collection: String,
        id: String,
        body: String,
    },
    Patch {
        collection: String,
        id: String,
        op: UpdateOp,
    },
    Delete {
        collection: String,
        id: String,
    },
    DropCollection {
        collection: String,
    },
}

/// Handle to the session backend. Clones share one connection and one
/// id generator.
#[derive(Debug, Clone)]
pub struct SessionStore {
    conn: SharedConnection,
    ids: Arc<HiLoIdGenerator>,
    max_requests_per_session: usize,
}

impl SessionStore {
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let conn = open_with_config(config)?;
        info!(
            "event=store_open module=store status=ok backend={BACKEND} mode={} node_tag={}",
            config.location.mode(),
            config.node_tag
        );
        Ok(Self::wrap(conn, config))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Wraps a connection already bootstrapped by [`crate::db::open_db`].
    pub fn from_connection(conn: Connection, config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        ensure_schema_ready(&conn, &REQUIRED_TABLES)?;
        Ok(Self::wrap(conn, config))
    }

    fn wrap(conn: Connection, config: &StoreConfig) -> Self {
        Self {
            conn: SharedConnection::new(conn, BACKEND),
            ids: Arc::new(HiLoIdGenerator::new(
                config.hilo_capacity,
                config.node_tag.clone(),
            )),
            max_requests_per_session: config.max_requests_per_session,
        }
    }

    /// Opens a session holding the connection until it is dropped.
    pub fn open_session(&self) -> StoreResult<DocumentSession<'_>> {
        let uow = self.conn.acquire()?;
        let session = DocumentSession {
            uow,
            ids: &self.ids,
            pending: Vec::new(),
            requests: 0,
            max_requests: self.max_requests_per_session,
            session_id: Uuid::new_v4(),
            opened_at: Instant::now(),
        };
        debug!(
            "event=session_open module=store status=ok backend={BACKEND} session={}",
            session.session_id
        );
        Ok(session)
    }

    pub fn list_collection_names(&self) -> StoreResult<Vec<String>> {
        let uow = self.conn.acquire()?;
        collection_names(&uow, BACKEND)
    }

    /// Removes every entity and collection of this backend. HiLo counters
    /// are kept so ids are never reissued.
    pub fn reset_storage(&self) -> StoreResult<()> {
        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        let removed = tx.execute("DELETE FROM typed_documents;", [])?;
        tx.execute("DELETE FROM collections WHERE backend = ?1;", [BACKEND])?;
        tx.commit()?;
        info!("event=store_reset module=store status=ok backend={BACKEND} removed={removed}");
        Ok(())
    }
}

/// Unit of work over the session backend.
///
/// Reads go straight to storage; writes queue until [`save_changes`].
///
/// [`save_changes`]: DocumentSession::save_changes
pub struct DocumentSession<'s> {
    uow: UnitOfWork<'s>,
    ids: &'s HiLoIdGenerator,
    pending: Vec<Command>,
    requests: usize,
    max_requests: usize,
    session_id: Uuid,
    opened_at: Instant,
}

impl DocumentSession<'_> {
    fn count_request(&mut self) -> StoreResult<()> {
        self.requests += 1;
        if self.requests > self.max_requests {
            warn!(
                "event=session_budget module=store status=error backend={BACKEND} session={} limit={}",
                self.session_id, self.max_requests
            );
            return Err(StoreError::RequestBudgetExceeded {
                limit: self.max_requests,
            });
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Queues `entity` for storage and returns its id, minting one when
    /// `id` is absent or empty.
    pub fn store<T: Serialize>(
        &mut self,
        collection: &str,
        id: Option<&str>,
        entity: &T,
    ) -> StoreResult<String> {
        let body = serde_json::to_value(entity)?;
        self.store_value(collection, id, body)
    }

    /// Like [`store`](Self::store) for an already-serialized body.
    pub fn store_value(
        &mut self,
        collection: &str,
        id: Option<&str>,
        mut body: serde_json::Value,
    ) -> StoreResult<String> {
        let object = body.as_object_mut().ok_or_else(|| {
            StoreError::InvalidData(format!(
                "entities stored in `{collection}` must serialize to JSON objects"
            ))
        })?;
        object.remove(ID_PROPERTY);

        let id = match id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.ids.next_id(&self.uow, collection)?,
        };
        self.pending.push(Command::Store {
            collection: collection.to_string(),
            id: id.clone(),
            body: body.to_string(),
        });
        Ok(id)
    }

    pub fn load(&mut self, collection: &str, id: &str) -> StoreResult<Option<serde_json::Value>> {
        self.count_request()?;
        let body: Option<String> = self
            .uow
            .query_row(
                "SELECT body FROM typed_documents WHERE doc_id = ?1 AND collection = ?2;",
                params![id, collection],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| parse_body(&body)).transpose()
    }

    pub fn exists(&mut self, collection: &str, id: &str) -> StoreResult<bool> {
        self.count_request()?;
        let exists: i64 = self.uow.query_row(
            "SELECT EXISTS(SELECT 1 FROM typed_documents WHERE doc_id = ?1 AND collection = ?2);",
            params![id, collection],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    pub fn query(&mut self, collection: &str, query: &Query) -> StoreResult<Vec<StoredEntity>> {
        self.count_request()?;
        let filter = translate_filter(&query.filter)?;
        let order = translate_sort(query.sort.as_ref())?;
        let sql = format!(
            "SELECT doc_id, body FROM typed_documents WHERE collection = ? AND ({}) ORDER BY {};",
            filter.sql, order.sql
        );
        let mut params = vec![SqlValue::Text(collection.to_string())];
        params.extend(filter.params);
        params.extend(order.params);

        let rows = {
            let mut stmt = self.uow.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, body)| -> StoreResult<StoredEntity> {
                let mut body = parse_body(&body)?;
                if let Some(projection) = &query.projection {
                    let document = Document::from_json(body)
                        .map_err(|err| StoreError::InvalidData(err.to_string()))?;
                    body = project(&document, projection, ID_PROPERTY).to_json();
                }
                Ok(StoredEntity { id, body })
            })
            .collect()
    }

    /// Ids of matching entities in natural order.
    pub fn query_ids(&mut self, collection: &str, filter: &Filter) -> StoreResult<Vec<String>> {
        self.count_request()?;
        let filter = translate_filter(filter)?;
        let sql = format!(
            "SELECT doc_id FROM typed_documents WHERE collection = ? AND ({}) ORDER BY seq ASC;",
            filter.sql
        );
        let mut params = vec![SqlValue::Text(collection.to_string())];
        params.extend(filter.params);

        let mut stmt = self.uow.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn count(&mut self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        self.count_request()?;
        let filter = translate_filter(filter)?;
        let sql = format!(
            "SELECT COUNT(*) FROM typed_documents WHERE collection = ? AND ({});",
            filter.sql
        );
        let mut params = vec![SqlValue::Text(collection.to_string())];
        params.extend(filter.params);
        let count: i64 = self
            .uow
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Queues a partial update of one entity.
    pub fn patch(&mut self, collection: &str, id: &str, op: UpdateOp) -> StoreResult<()> {
        if op.field().split('.').next() == Some(ID_PROPERTY) {
            return Err(StoreError::InvalidQuery(format!(
                "patch cannot modify identity property `{ID_PROPERTY}`"
            )));
        }
        translate_patch(&op)?;
        self.pending.push(Command::Patch {
            collection: collection.to_string(),
            id: id.to_string(),
            op,
        });
        Ok(())
    }

    pub fn delete(&mut self, collection: &str, id: &str) {
        self.pending.push(Command::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    pub fn drop_collection(&mut self, collection: &str) {
        self.pending.push(Command::DropCollection {
            collection: collection.to_string(),
        });
    }

    /// Flushes every queued command in one transaction.
    pub fn save_changes(&mut self) -> StoreResult<SaveSummary> {
        if self.pending.is_empty() {
            return Ok(SaveSummary::default());
        }
        self.count_request()?;

        let started_at = Instant::now();
        let commands = std::mem::take(&mut self.pending);
        let tx = self.uow.transaction()?;
        let mut summary = SaveSummary::default();
        for command in &commands {
            execute_command(&tx, command, &mut summary)?;
        }
        tx.commit()?;

        debug!(
            "event=save_changes module=store status=ok backend={BACKEND} session={} stored={} patched={} deleted={} duration_ms={}",
            self.session_id,
            summary.stored,
            summary.patched,
            summary.deleted,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }
}

impl Drop for DocumentSession<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "event=session_close module=store status=discarded backend={BACKEND} session={} pending={}",
                self.session_id,
                self.pending.len()
            );
        }
        debug!(
            "event=session_close module=store status=ok backend={BACKEND} session={} requests={} open_ms={}",
            self.session_id,
            self.requests,
            self.opened_at.elapsed().as_millis()
        );
    }
}

fn execute_command(
    tx: &Transaction<'_>,
    command: &Command,
    summary: &mut SaveSummary,
) -> StoreResult<()> {
    match command {
        Command::Store {
            collection,
            id,
            body,
        } => {
            register_collection(tx, BACKEND, collection)?;
            let written = tx
                .execute(
                    "INSERT INTO typed_documents (doc_id, collection, body) VALUES (?1, ?2, ?3)
                     ON CONFLICT(doc_id) DO UPDATE
                        SET body = excluded.body, revision = typed_documents.revision + 1
                        WHERE typed_documents.collection = excluded.collection;",
                    params![id, collection, body],
                )
                .map_err(|err| {
                    if is_constraint_violation(&err) {
                        duplicate(collection, id)
                    } else {
                        err.into()
                    }
                })?;
            if written == 0 {
                return Err(duplicate(collection, id));
            }
            summary.stored += 1;
        }
        Command::Patch { collection, id, op } => {
            let patch = translate_patch(op)?;
            let guard = if patch.guard.is_empty() {
                String::new()
            } else {
                format!(" AND {}", patch.guard)
            };
            let sql = format!(
                "UPDATE typed_documents SET body = {}, revision = revision + 1 \
                 WHERE collection = ? AND doc_id = ?{guard};",
                patch.expression
            );
            let mut params = patch.params;
            params.push(SqlValue::Text(collection.clone()));
            params.push(SqlValue::Text(id.clone()));
            params.extend(patch.guard_params);

            let written = tx.execute(&sql, params_from_iter(params.iter()))?;
            if written == 0 && !patch.guard.is_empty() && entity_exists(tx, collection, id)? {
                return Err(StoreError::InvalidQuery(format!(
                    "cannot increment non-numeric field `{}` of `{id}`",
                    op.field()
                )));
            }
            summary.patched += written;
        }
        Command::Delete { collection, id } => {
            summary.deleted += tx.execute(
                "DELETE FROM typed_documents WHERE collection = ?1 AND doc_id = ?2;",
                params![collection, id],
            )?;
        }
        Command::DropCollection { collection } => {
            summary.deleted += tx.execute(
                "DELETE FROM typed_documents WHERE collection = ?1;",
                [collection],
            )?;
            unregister_collection(tx, BACKEND, collection)?;
        }
    }
    Ok(())
}

fn entity_exists(conn: &Connection, collection: &str, id: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM typed_documents WHERE doc_id = ?1 AND collection = ?2);",
        params![id, collection],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn duplicate(collection: &str, id: &str) -> StoreError {
    StoreError::DuplicateKey {
        collection: collection.to_string(),
        key: id.to_string(),
    }
}

fn parse_body(body: &str) -> StoreResult<serde_json::Value> {
    serde_json::from_str(body).map_err(|err| StoreError::InvalidData(err.to_string()))
}
