use biblio_core::db::migrations::latest_version;
use biblio_core::db::{open_db, open_db_in_memory, open_with_config, DbError};
use biblio_core::store::{DocumentStore, SessionStore};
use biblio_core::{StoreConfig, StoreError};
use rusqlite::Connection;
use std::time::Duration;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "collections");
    assert_table_exists(&conn, "documents");
    assert_table_exists(&conn, "typed_documents");
    assert_table_exists(&conn, "hilo");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("biblio.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "documents");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn file_databases_use_wal_and_the_configured_busy_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("wal.db"))
        .with_busy_timeout(Duration::from_millis(1500));

    let conn = open_with_config(&config).unwrap();
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    let busy_timeout: i64 = conn
        .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
        .unwrap();

    assert_eq!(journal_mode.to_ascii_lowercase(), "wal");
    assert_eq!(busy_timeout, 1500);
}

#[test]
fn regexp_function_is_registered_on_open() {
    let conn = open_db_in_memory().unwrap();
    let matched: bool = conn
        .query_row("SELECT 'Lovelace' REGEXP '^Love';", [], |row| row.get(0))
        .unwrap();
    assert!(matched);
}

#[test]
fn stores_reject_connections_that_skipped_bootstrap() {
    let raw = Connection::open_in_memory().unwrap();
    let err = DocumentStore::from_connection(raw).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Db(DbError::UninitializedConnection {
            actual_version: 0,
            ..
        })
    ));

    let bootstrapped = open_db_in_memory().unwrap();
    assert!(SessionStore::from_connection(bootstrapped, &StoreConfig::in_memory()).is_ok());
}

#[test]
fn both_backends_share_one_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::file(dir.path().join("shared.db"));

    let documents = DocumentStore::open(&config).unwrap();
    let sessions = SessionStore::open(&config).unwrap();

    documents
        .collection("authors")
        .insert_one(biblio_core::Document::new().with("name", "Ada Lovelace"))
        .unwrap();
    let mut session = sessions.open_session().unwrap();
    session
        .store_value("books", None, serde_json::json!({ "title": "Notes" }))
        .unwrap();
    session.save_changes().unwrap();
    drop(session);

    assert_eq!(documents.list_collection_names().unwrap(), vec!["authors"]);
    assert_eq!(sessions.list_collection_names().unwrap(), vec!["books"]);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table `{table_name}` should exist");
}
