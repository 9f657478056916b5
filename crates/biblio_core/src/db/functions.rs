//! Application-defined SQL functions.

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Error};
use std::sync::Arc;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `regexp(pattern, text)`: true when `text` matches `pattern`.
///
/// The compiled pattern is cached per statement as auxiliary data.
/// Non-text inputs never match.
pub(super) fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |raw| -> Result<_, BoxError> {
                Ok(Regex::new(raw.as_str()?)?)
            })?;
            let is_match = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => {
                    let text = std::str::from_utf8(bytes)
                        .map_err(|err| Error::UserFunctionError(err.into()))?;
                    pattern.is_match(text)
                }
                _ => false,
            };
            Ok(is_match)
        },
    )
}
