//! Backend handles and scoped units of work.
//!
//! # Responsibility
//! - Own the SQLite connection behind each backend handle.
//! - Lend it out through [`UnitOfWork`] guards that release on drop.
//! - Track which collections exist per backend.
//!
//! # Invariants
//! - Handles are cheap clones of one shared connection.
//! - A unit of work is released on every exit path, including errors.
//! - A poisoned connection lock surfaces as [`StoreError::Unavailable`].

mod document_store;
mod handle;
mod session_store;

pub use document_store::{Collection, DeleteResult, DocumentStore, InsertOneResult, UpdateResult};
pub use handle::{Backend, LazyHandle};
pub use session_store::{DocumentSession, SaveSummary, SessionStore, StoredEntity, ID_PROPERTY};

use crate::config::ConfigError;
use crate::db::DbError;
use log::{error, trace};
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Config(ConfigError),
    Unavailable(String),
    DuplicateKey { collection: String, key: String },
    InvalidQuery(String),
    InvalidData(String),
    Serialization(serde_json::Error),
    RequestBudgetExceeded { limit: usize },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Config(err) => write!(f, "invalid store config: {err}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::DuplicateKey { collection, key } => {
                write!(f, "duplicate key `{key}` in collection `{collection}`")
            }
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored data: {message}"),
            Self::Serialization(err) => write!(f, "{err}"),
            Self::RequestBudgetExceeded { limit } => {
                write!(f, "session exceeded its budget of {limit} requests")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::Unavailable(_)
            | Self::DuplicateKey { .. }
            | Self::InvalidQuery(_)
            | Self::InvalidData(_)
            | Self::RequestBudgetExceeded { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ConfigError> for StoreError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

/// Connection shared by every clone of a backend handle.
#[derive(Debug, Clone)]
pub(crate) struct SharedConnection {
    inner: Arc<Mutex<Connection>>,
    backend: &'static str,
}

impl SharedConnection {
    pub(crate) fn new(conn: Connection, backend: &'static str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(conn)),
            backend,
        }
    }

    pub(crate) fn acquire(&self) -> StoreResult<UnitOfWork<'_>> {
        let guard = self.inner.lock().map_err(|_| {
            error!(
                "event=unit_of_work module=store status=error backend={} error_code=connection_poisoned",
                self.backend
            );
            StoreError::Unavailable(format!("{} store connection is poisoned", self.backend))
        })?;
        Ok(UnitOfWork {
            guard,
            backend: self.backend,
            started_at: Instant::now(),
        })
    }
}

/// Scoped, exclusive borrow of a backend connection.
pub struct UnitOfWork<'a> {
    guard: MutexGuard<'a, Connection>,
    backend: &'static str,
    started_at: Instant,
}

impl Deref for UnitOfWork<'_> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for UnitOfWork<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        trace!(
            "event=unit_of_work module=store status=released backend={} held_us={}",
            self.backend,
            self.started_at.elapsed().as_micros()
        );
    }
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub(crate) fn register_collection(conn: &Connection, backend: &str, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO collections (backend, name) VALUES (?1, ?2)
         ON CONFLICT(backend, name) DO NOTHING;",
        params![backend, name],
    )?;
    Ok(())
}

pub(crate) fn unregister_collection(conn: &Connection, backend: &str, name: &str) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM collections WHERE backend = ?1 AND name = ?2;",
        params![backend, name],
    )?;
    Ok(())
}

pub(crate) fn collection_names(conn: &Connection, backend: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM collections WHERE backend = ?1 ORDER BY name;")?;
    let names = stmt
        .query_map([backend], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
