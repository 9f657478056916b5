//! Identity strategies for the two backends.
//!
//! # Responsibility
//! - Convert caller-facing string ids into backend-native identity values.
//! - Convert native identity values back into strings.
//! - Mint composite ids for the session backend through persisted HiLo blocks.
//!
//! # Invariants
//! - `from_native` never fails.
//! - Opaque strings that are not valid object ids fall back to plain strings.
//! - HiLo counters never decrease, so composite ids are never reused.

use crate::db::DbResult;
use crate::document::{ObjectId, Value};
use log::debug;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Bidirectional mapping between string ids and backend-native identity.
pub trait IdentityStrategy {
    fn to_native(&self, id: &str) -> Value;
    fn from_native(&self, value: &Value) -> String;
}

/// Identity of the document backend: 12-byte object ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueIdentity;

impl IdentityStrategy for OpaqueIdentity {
    fn to_native(&self, id: &str) -> Value {
        match ObjectId::parse_str(id) {
            Ok(object_id) => Value::ObjectId(object_id),
            Err(err) => {
                debug!("event=identity_fallback module=identity status=ok strategy=opaque reason={err}");
                Value::String(id.to_string())
            }
        }
    }

    fn from_native(&self, value: &Value) -> String {
        stringify_native(value)
    }
}

/// Identity of the session backend: `"<collection>/<n>-<node>"` strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositeIdentity;

impl IdentityStrategy for CompositeIdentity {
    fn to_native(&self, id: &str) -> Value {
        Value::String(id.to_string())
    }

    fn from_native(&self, value: &Value) -> String {
        stringify_native(value)
    }
}

/// String form of any native identity value.
pub fn stringify_native(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Int(number) => number.to_string(),
        Value::Double(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::ObjectId(id) => id.to_hex(),
        Value::Array(_) | Value::Document(_) => value.to_json().to_string(),
    }
}

/// Formats a composite id, e.g. `authors/1-A`.
pub fn composite_id(collection: &str, number: u64, node_tag: &str) -> String {
    format!("{}/{}-{}", collection.to_lowercase(), number, node_tag)
}

/// Splits a composite id into collection, number and node tag.
pub fn parse_composite_id(id: &str) -> Option<(&str, u64, &str)> {
    let (collection, rest) = id.rsplit_once('/')?;
    let (number, node_tag) = rest.split_once('-')?;
    if collection.is_empty() || node_tag.is_empty() {
        return None;
    }
    Some((collection, number.parse().ok()?, node_tag))
}

#[derive(Debug, Clone, Copy)]
struct HiLoRange {
    next: u64,
    max: u64,
}

/// Client-side composite id generator.
///
/// Each collection reserves `capacity` numbers at a time from the `hilo`
/// table and hands them out from memory until the block is exhausted.
#[derive(Debug)]
pub struct HiLoIdGenerator {
    capacity: u64,
    node_tag: String,
    ranges: Mutex<HashMap<String, HiLoRange>>,
}

impl HiLoIdGenerator {
    pub fn new(capacity: u64, node_tag: impl Into<String>) -> Self {
        Self {
            capacity: capacity.max(1),
            node_tag: node_tag.into(),
            ranges: Mutex::new(HashMap::new()),
        }
    }

    pub fn node_tag(&self) -> &str {
        &self.node_tag
    }

    /// Next composite id for `collection`.
    pub fn next_id(&self, conn: &Connection, collection: &str) -> DbResult<String> {
        let number = self.next_number(conn, collection)?;
        Ok(composite_id(collection, number, &self.node_tag))
    }

    /// Next number for `collection`, reserving a fresh block when needed.
    pub fn next_number(&self, conn: &Connection, collection: &str) -> DbResult<u64> {
        // Ranges hold plain counters, so a poisoned map is still consistent.
        let mut ranges = self.ranges.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(range) = ranges.get_mut(collection) {
            if range.next <= range.max {
                let number = range.next;
                range.next += 1;
                return Ok(number);
            }
        }

        let (low, high) = reserve_block(conn, collection, self.capacity)?;
        debug!(
            "event=hilo_reserve module=identity status=ok collection={collection} low={low} high={high}"
        );
        ranges.insert(
            collection.to_string(),
            HiLoRange {
                next: low + 1,
                max: high,
            },
        );
        Ok(low)
    }
}

fn reserve_block(conn: &Connection, collection: &str, capacity: u64) -> DbResult<(u64, u64)> {
    let capacity = i64::try_from(capacity).unwrap_or(i64::MAX);
    conn.execute(
        "INSERT INTO hilo (collection, max_value) VALUES (?1, 0)
         ON CONFLICT(collection) DO NOTHING;",
        [collection],
    )?;
    let high: i64 = conn.query_row(
        "UPDATE hilo SET max_value = max_value + ?2 WHERE collection = ?1 RETURNING max_value;",
        params![collection, capacity],
        |row| row.get(0),
    )?;
    let low = high - capacity + 1;
    Ok((low.max(1) as u64, high.max(0) as u64))
}
