//! Embedded document backend.
//!
//! # Responsibility
//! - Persist extended-JSON documents per collection, keyed by `_id`.
//! - Generate an object id for documents inserted without one.
//! - Evaluate filters, sorts, projections and updates in process.
//!
//! # Invariants
//! - `_id` is unique within a collection and always the first field.
//! - Natural order is insertion order; replacing a document keeps its slot.
//! - Batch writes run in one transaction and persist all or nothing.

use super::{
    collection_names, is_constraint_violation, register_collection, unregister_collection,
    SharedConnection, StoreError, StoreResult,
};
use crate::config::StoreConfig;
use crate::db::{ensure_schema_ready, open_with_config};
use crate::document::{Document, ObjectId, Value, ID_FIELD};
use crate::query::matcher::{apply_update, project, sort_documents, Matcher};
use crate::query::{Filter, Query, Update};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

const BACKEND: &str = "document";
const REQUIRED_TABLES: [&str; 2] = ["collections", "documents"];

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Handle to the document backend. Clones share one connection.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    conn: SharedConnection,
}

impl DocumentStore {
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let conn = open_with_config(config)?;
        info!(
            "event=store_open module=store status=ok backend={BACKEND} mode={}",
            config.location.mode()
        );
        Ok(Self {
            conn: SharedConnection::new(conn, BACKEND),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Wraps a connection already bootstrapped by [`crate::db::open_db`].
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        ensure_schema_ready(&conn, &REQUIRED_TABLES)?;
        Ok(Self {
            conn: SharedConnection::new(conn, BACKEND),
        })
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection {
            conn: self.conn.clone(),
            name: name.into(),
        }
    }

    pub fn list_collection_names(&self) -> StoreResult<Vec<String>> {
        let uow = self.conn.acquire()?;
        collection_names(&uow, BACKEND)
    }

    /// Removes every document and collection of this backend.
    pub fn reset_storage(&self) -> StoreResult<()> {
        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        let removed = tx.execute("DELETE FROM documents;", [])?;
        tx.execute("DELETE FROM collections WHERE backend = ?1;", [BACKEND])?;
        tx.commit()?;
        info!("event=store_reset module=store status=ok backend={BACKEND} removed={removed}");
        Ok(())
    }
}

/// One named collection of a [`DocumentStore`].
#[derive(Debug, Clone)]
pub struct Collection {
    conn: SharedConnection,
    name: String,
}

impl Collection {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert_one(&self, document: Document) -> StoreResult<InsertOneResult> {
        let (key, body, inserted_id) = prepare_insert(document)?;
        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        register_collection(&tx, BACKEND, &self.name)?;
        insert_row(&tx, &self.name, &key, &body)?;
        tx.commit()?;
        debug!(
            "event=insert_one module=store status=ok backend={BACKEND} collection={} key={key}",
            self.name
        );
        Ok(InsertOneResult { inserted_id })
    }

    /// Inserts all documents or none. Returns ids in input order.
    pub fn insert_many(&self, documents: Vec<Document>) -> StoreResult<Vec<Value>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let prepared = documents
            .into_iter()
            .map(prepare_insert)
            .collect::<StoreResult<Vec<_>>>()?;

        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        register_collection(&tx, BACKEND, &self.name)?;
        let mut ids = Vec::with_capacity(prepared.len());
        for (key, body, id) in prepared {
            insert_row(&tx, &self.name, &key, &body)?;
            ids.push(id);
        }
        tx.commit()?;
        debug!(
            "event=insert_many module=store status=ok backend={BACKEND} collection={} count={}",
            self.name,
            ids.len()
        );
        Ok(ids)
    }

    pub fn find_by_id(&self, id: &Value) -> StoreResult<Option<Document>> {
        let key = document_key(id)?;
        let uow = self.conn.acquire()?;
        let body: Option<String> = uow
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_key = ?2;",
                params![self.name, key],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| parse_body(&body)).transpose()
    }

    pub fn find(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let matcher = Matcher::compile(&query.filter)?;
        let rows = {
            let uow = self.conn.acquire()?;
            load_rows(&uow, &self.name)?
        };

        let mut documents = rows
            .into_iter()
            .map(|(_, document)| document)
            .filter(|document| matcher.matches(document))
            .collect::<Vec<_>>();
        if let Some(sort) = &query.sort {
            sort_documents(&mut documents, sort);
        }
        if let Some(projection) = &query.projection {
            documents = documents
                .iter()
                .map(|document| project(document, projection, ID_FIELD))
                .collect();
        }
        Ok(documents)
    }

    pub fn count_documents(&self, filter: &Filter) -> StoreResult<u64> {
        if filter.is_unconstrained() {
            let uow = self.conn.acquire()?;
            let count: i64 = uow.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1;",
                [&self.name],
                |row| row.get(0),
            )?;
            return Ok(count as u64);
        }
        let matcher = Matcher::compile(filter)?;
        let uow = self.conn.acquire()?;
        let count = load_rows(&uow, &self.name)?
            .iter()
            .filter(|(_, document)| matcher.matches(document))
            .count();
        Ok(count as u64)
    }

    /// Replaces the document with `id`. The stored `_id` always wins over
    /// any `_id` inside `replacement`.
    pub fn replace_one(&self, id: &Value, mut replacement: Document) -> StoreResult<UpdateResult> {
        let key = document_key(id)?;
        replacement.prepend(ID_FIELD, id.clone());

        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        let existing: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND doc_key = ?2;",
                params![self.name, key],
                |row| row.get(0),
            )
            .optional()?;
        let Some(existing) = existing else {
            return Ok(UpdateResult::default());
        };

        let modified = parse_body(&existing)? != replacement;
        if modified {
            tx.execute(
                "UPDATE documents SET body = ?3 WHERE collection = ?1 AND doc_key = ?2;",
                params![self.name, key, replacement.to_json_string()],
            )?;
        }
        tx.commit()?;
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: u64::from(modified),
        })
    }

    pub fn update_many(&self, filter: &Filter, update: &Update) -> StoreResult<UpdateResult> {
        update.validate(ID_FIELD).map_err(StoreError::InvalidQuery)?;
        let matcher = Matcher::compile(filter)?;

        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        let mut result = UpdateResult::default();
        for (key, document) in load_rows(&tx, &self.name)? {
            if !matcher.matches(&document) {
                continue;
            }
            result.matched_count += 1;

            let mut updated = document.clone();
            apply_update(&mut updated, update)?;
            if updated != document {
                tx.execute(
                    "UPDATE documents SET body = ?3 WHERE collection = ?1 AND doc_key = ?2;",
                    params![self.name, key, updated.to_json_string()],
                )?;
                result.modified_count += 1;
            }
        }
        tx.commit()?;
        debug!(
            "event=update_many module=store status=ok backend={BACKEND} collection={} matched={} modified={}",
            self.name, result.matched_count, result.modified_count
        );
        Ok(result)
    }

    pub fn delete_one(&self, id: &Value) -> StoreResult<DeleteResult> {
        let key = document_key(id)?;
        let uow = self.conn.acquire()?;
        let deleted = uow.execute(
            "DELETE FROM documents WHERE collection = ?1 AND doc_key = ?2;",
            params![self.name, key],
        )?;
        Ok(DeleteResult {
            deleted_count: deleted as u64,
        })
    }

    pub fn delete_many(&self, filter: &Filter) -> StoreResult<DeleteResult> {
        let mut uow = self.conn.acquire()?;
        if filter.is_unconstrained() {
            let deleted = uow.execute("DELETE FROM documents WHERE collection = ?1;", [&self.name])?;
            return Ok(DeleteResult {
                deleted_count: deleted as u64,
            });
        }

        let matcher = Matcher::compile(filter)?;
        let tx = uow.transaction()?;
        let mut deleted = 0u64;
        for (key, document) in load_rows(&tx, &self.name)? {
            if matcher.matches(&document) {
                deleted += tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND doc_key = ?2;",
                    params![self.name, key],
                )? as u64;
            }
        }
        tx.commit()?;
        Ok(DeleteResult {
            deleted_count: deleted,
        })
    }

    /// Removes all documents and the collection's metadata.
    pub fn drop_collection(&self) -> StoreResult<()> {
        let mut uow = self.conn.acquire()?;
        let tx = uow.transaction()?;
        let removed = tx.execute("DELETE FROM documents WHERE collection = ?1;", [&self.name])?;
        unregister_collection(&tx, BACKEND, &self.name)?;
        tx.commit()?;
        info!(
            "event=drop_collection module=store status=ok backend={BACKEND} collection={} removed={removed}",
            self.name
        );
        Ok(())
    }
}

/// Assigns a missing `_id` and renders the row key and body.
fn prepare_insert(mut document: Document) -> StoreResult<(String, String, Value)> {
    let id = match document.get(ID_FIELD) {
        Some(id) if !id.is_null() => id.clone(),
        _ => Value::ObjectId(ObjectId::new()),
    };
    document.prepend(ID_FIELD, id.clone());
    let key = document_key(&id)?;
    Ok((key, document.to_json_string(), id))
}

/// Row key for an identity value. Keys are typed so that the object id
/// `507f...` and the string `"507f..."` stay distinct.
fn document_key(id: &Value) -> StoreResult<String> {
    match id {
        Value::ObjectId(oid) => Ok(format!("oid:{}", oid.to_hex())),
        Value::String(text) => Ok(format!("str:{text}")),
        Value::Int(number) => Ok(format!("int:{number}")),
        other => Err(StoreError::InvalidQuery(format!(
            "a {} value cannot be used as `{ID_FIELD}`",
            other.type_name()
        ))),
    }
}

fn insert_row(conn: &Connection, collection: &str, key: &str, body: &str) -> StoreResult<()> {
    match conn.execute(
        "INSERT INTO documents (collection, doc_key, body) VALUES (?1, ?2, ?3);",
        params![collection, key, body],
    ) {
        Ok(_) => Ok(()),
        Err(err) if is_constraint_violation(&err) => Err(StoreError::DuplicateKey {
            collection: collection.to_string(),
            key: key.to_string(),
        }),
        Err(err) => Err(err.into()),
    }
}

fn load_rows(conn: &Connection, collection: &str) -> StoreResult<Vec<(String, Document)>> {
    let mut stmt = conn.prepare(
        "SELECT doc_key, body FROM documents WHERE collection = ?1 ORDER BY seq ASC;",
    )?;
    let rows = stmt
        .query_map([collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(key, body)| -> StoreResult<(String, Document)> { Ok((key, parse_body(&body)?)) })
        .collect()
}

fn parse_body(body: &str) -> StoreResult<Document> {
    Document::from_json_str(body).map_err(|err| StoreError::InvalidData(err.to_string()))
}
