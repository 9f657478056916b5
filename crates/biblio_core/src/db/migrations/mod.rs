//! Schema steps for both storage backends.
//!
//! # Responsibility
//! - Keep the ordered list of schema steps, one per backend table family.
//! - Bring a connection up to the newest step inside one transaction.
//!
//! # Invariants
//! - Step versions start at 1 and grow by exactly one.
//! - `PRAGMA user_version` always equals the last step applied.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

/// One schema step: a versioned batch of DDL.
#[derive(Debug, Clone, Copy)]
pub struct SchemaStep {
    pub version: u32,
    pub name: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "document_store",
        sql: include_str!("0001_document_store.sql"),
    },
    SchemaStep {
        version: 2,
        name: "session_store",
        sql: include_str!("0002_session_store.sql"),
    },
];

/// Schema version produced by the newest step this build knows.
pub fn latest_version() -> u32 {
    STEPS.len() as u32
}

/// Steps newer than `version`, in application order.
pub fn pending_steps(version: u32) -> impl Iterator<Item = &'static SchemaStep> {
    STEPS.iter().filter(move |step| step.version > version)
}

/// Upgrades `conn` to [`latest_version`] and returns the names of the
/// steps that ran. A database written by a newer build is refused.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<Vec<&'static str>> {
    let from = current_user_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    let tx = conn.transaction()?;
    let mut applied = Vec::new();
    for step in pending_steps(from) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        debug!(
            "event=schema_step module=db status=ok version={} name={}",
            step.version, step.name
        );
        applied.push(step.name);
    }
    tx.commit()?;

    if !applied.is_empty() {
        info!(
            "event=db_migrate module=db status=ok from_version={from} to_version={latest} steps={}",
            applied.join(",")
        );
    }
    Ok(applied)
}

pub(crate) fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}
