//! Core of biblio: library records persisted through one repository
//! contract over two embedded document backends.

pub mod codec;
pub mod config;
pub mod db;
pub mod document;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod store;

pub use codec::{Codec, CodecError, IdentityAccessor, LibraryEntity, Record, RecordIdentity};
pub use config::{StoreConfig, StoreLocation};
pub use document::{Document, ObjectId, Value};
pub use loader::{DataLoader, EntitySource, JsonFileSource, LoadError, LoadReport, ResetStrategy};
pub use logging::{default_log_level, init_logging, logging_status, LogSink, LoggingError};
pub use model::{Author, Book, Category, Member, Publisher};
pub use query::{Filter, Projection, Query, Sort, Update};
pub use repo::{
    AuthorQueries, BookQueries, CategoryQueries, DocumentRepository, MemberQueries,
    PublisherQueries, RepoError, RepoResult, Repository, SessionRepository,
};
pub use store::{Backend, DocumentStore, LazyHandle, SessionStore, StoreError};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
