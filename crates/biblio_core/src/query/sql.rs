//! Translation of filters, sorts and patches into SQLite JSON1 SQL.
//!
//! Bodies live in a `body` column as JSON text. Every field test scans
//! `json_each(<source>, <path>)`, which yields the value itself for scalars
//! and one row per element for arrays, so array fields match when any
//! element does. Object-valued fields never match a scalar test.
//! The top-level `id` field is not part of the body; it reads the
//! `doc_id` column instead.
//!
//! # Invariants
//! - Parameters are positional and pushed in the order their `?` appears.
//! - Only scalar values are compared; documents and arrays are rejected.

use super::{Filter, Sort, SortOrder, UpdateOp};
use crate::document::{split_path, Value};
use crate::store::{StoreError, StoreResult, ID_PROPERTY};
use regex::RegexBuilder;
use rusqlite::types::Value as SqlValue;

/// `WHERE` fragment plus its bound parameters.
#[derive(Debug)]
pub(crate) struct SqlFragment {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlValue>,
}

pub(crate) fn translate_filter(filter: &Filter) -> StoreResult<SqlFragment> {
    let mut translator = Translator::default();
    let sql = translator.filter(filter, "body")?;
    Ok(SqlFragment {
        sql,
        params: translator.params,
    })
}

/// `ORDER BY` terms for `sort`, ending with insertion order.
pub(crate) fn translate_sort(sort: Option<&Sort>) -> StoreResult<SqlFragment> {
    let mut terms = Vec::new();
    let mut params = Vec::new();
    for (field, order) in sort.map(Sort::keys).unwrap_or_default() {
        let direction = match order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        if field == ID_PROPERTY {
            terms.push(format!("doc_id {direction}"));
            continue;
        }
        params.push(SqlValue::Text(json_path(field)?));
        terms.push(format!("json_extract(body, ?) {direction}"));
    }
    terms.push("seq ASC".to_string());
    Ok(SqlFragment {
        sql: terms.join(", "),
        params,
    })
}

/// Patch statement pieces for one update operation.
#[derive(Debug)]
pub(crate) struct PatchSql {
    /// New value for the `body` column.
    pub(crate) expression: String,
    pub(crate) params: Vec<SqlValue>,
    /// Extra `AND` condition the row must satisfy; empty when unconditional.
    pub(crate) guard: String,
    pub(crate) guard_params: Vec<SqlValue>,
}

pub(crate) fn translate_patch(op: &UpdateOp) -> StoreResult<PatchSql> {
    let path = json_path(op.field())?;
    Ok(match op {
        UpdateOp::Set(_, value) => PatchSql {
            expression: "json_set(body, ?, json(?))".to_string(),
            params: vec![
                SqlValue::Text(path),
                SqlValue::Text(value.to_plain_json().to_string()),
            ],
            guard: String::new(),
            guard_params: Vec::new(),
        },
        UpdateOp::Unset(_) => PatchSql {
            expression: "json_remove(body, ?)".to_string(),
            params: vec![SqlValue::Text(path)],
            guard: String::new(),
            guard_params: Vec::new(),
        },
        UpdateOp::Inc(field, delta) => PatchSql {
            expression: "json_set(body, ?, COALESCE(json_extract(body, ?), 0) + ?)".to_string(),
            params: vec![
                SqlValue::Text(path.clone()),
                SqlValue::Text(path.clone()),
                numeric_param(field, delta)?,
            ],
            guard: "(json_type(body, ?) IS NULL OR json_type(body, ?) IN ('null', 'integer', 'real'))"
                .to_string(),
            guard_params: vec![SqlValue::Text(path.clone()), SqlValue::Text(path)],
        },
    })
}

#[derive(Default)]
struct Translator {
    params: Vec<SqlValue>,
    next_alias: usize,
}

impl Translator {
    fn alias(&mut self) -> String {
        self.next_alias += 1;
        format!("j{}", self.next_alias)
    }

    fn filter(&mut self, filter: &Filter, source: &str) -> StoreResult<String> {
        if source == "body" && filter.field() == Some(ID_PROPERTY) {
            return self.id_filter(filter);
        }
        match filter {
            Filter::All => Ok("1 = 1".to_string()),
            Filter::Eq(field, value) => self.equality(field, value, source),
            Filter::Ne(field, value) => Ok(format!("NOT {}", self.equality(field, value, source)?)),
            Filter::Gt(field, value) => self.range(field, ">", value, source),
            Filter::Gte(field, value) => self.range(field, ">=", value, source),
            Filter::Lt(field, value) => self.range(field, "<", value, source),
            Filter::Lte(field, value) => self.range(field, "<=", value, source),
            Filter::In(field, values) => {
                if values.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                let terms = values
                    .iter()
                    .map(|value| self.equality(field, value, source))
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(format!("({})", terms.join(" OR ")))
            }
            Filter::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|err| {
                        StoreError::InvalidQuery(format!("invalid pattern for `{field}`: {err}"))
                    })?;
                let pattern = if *case_insensitive {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                self.scan(field, source, |translator, alias| {
                    translator.params.push(SqlValue::Text(pattern));
                    format!("{alias}.type = 'text' AND regexp(?, {alias}.value)")
                })
            }
            Filter::Exists(field, present) => {
                self.params.push(SqlValue::Text(json_path(field)?));
                let negation = if *present { "NOT " } else { "" };
                Ok(format!("json_type({source}, ?) IS {negation}NULL"))
            }
            Filter::ElemMatch(field, inner) => {
                let path = json_path(field)?;
                let alias = self.alias();
                self.params.push(SqlValue::Text(path.clone()));
                self.params.push(SqlValue::Text(path));
                let element = format!("{alias}.value");
                let condition = self.filter(inner, &element)?;
                Ok(format!(
                    "EXISTS (SELECT 1 FROM json_each({source}, ?) AS {alias} \
                     WHERE json_type({source}, ?) = 'array' \
                     AND {alias}.type = 'object' AND ({condition}))"
                ))
            }
            Filter::And(filters) => self.junction(filters, " AND ", "1 = 1", source),
            Filter::Or(filters) => self.junction(filters, " OR ", "0 = 1", source),
            Filter::Not(inner) => Ok(format!("NOT ({})", self.filter(inner, source)?)),
        }
    }

    /// Tests on the `doc_id` column. Ids are always present text.
    fn id_filter(&mut self, filter: &Filter) -> StoreResult<String> {
        match filter {
            Filter::Eq(_, value) => self.id_compare("=", value),
            Filter::Ne(_, value) => Ok(format!("NOT ({})", self.id_compare("=", value)?)),
            Filter::Gt(_, value) => self.id_compare(">", value),
            Filter::Gte(_, value) => self.id_compare(">=", value),
            Filter::Lt(_, value) => self.id_compare("<", value),
            Filter::Lte(_, value) => self.id_compare("<=", value),
            Filter::In(_, values) => {
                let terms = values
                    .iter()
                    .map(|value| self.id_compare("=", value))
                    .collect::<StoreResult<Vec<_>>>()?;
                if terms.is_empty() {
                    return Ok("0 = 1".to_string());
                }
                Ok(format!("({})", terms.join(" OR ")))
            }
            Filter::Regex {
                pattern,
                case_insensitive,
                ..
            } => {
                RegexBuilder::new(pattern)
                    .case_insensitive(*case_insensitive)
                    .build()
                    .map_err(|err| {
                        StoreError::InvalidQuery(format!("invalid pattern for `{ID_PROPERTY}`: {err}"))
                    })?;
                let pattern = if *case_insensitive {
                    format!("(?i){pattern}")
                } else {
                    pattern.clone()
                };
                self.params.push(SqlValue::Text(pattern));
                Ok("regexp(?, doc_id)".to_string())
            }
            Filter::Exists(_, present) => Ok(if *present { "1 = 1" } else { "0 = 1" }.to_string()),
            Filter::ElemMatch(..) => Ok("0 = 1".to_string()),
            Filter::All | Filter::And(_) | Filter::Or(_) | Filter::Not(_) => Err(
                StoreError::InvalidQuery("combinators carry no field".to_string()),
            ),
        }
    }

    fn id_compare(&mut self, op: &str, value: &Value) -> StoreResult<String> {
        match value {
            Value::String(_) | Value::ObjectId(_) => {
                self.params.push(scalar_param(ID_PROPERTY, value)?);
                Ok(format!("doc_id {op} ?"))
            }
            Value::Array(_) | Value::Document(_) => Err(StoreError::InvalidQuery(format!(
                "cannot compare `{ID_PROPERTY}` against a {} value",
                value.type_name()
            ))),
            _ => Ok("0 = 1".to_string()),
        }
    }

    fn junction(
        &mut self,
        filters: &[Filter],
        separator: &str,
        empty: &str,
        source: &str,
    ) -> StoreResult<String> {
        if filters.is_empty() {
            return Ok(empty.to_string());
        }
        let terms = filters
            .iter()
            .map(|filter| self.filter(filter, source).map(|sql| format!("({sql})")))
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(format!("({})", terms.join(separator)))
    }

    fn equality(&mut self, field: &str, value: &Value, source: &str) -> StoreResult<String> {
        match value {
            Value::Null => {
                let path = json_path(field)?;
                self.params.push(SqlValue::Text(path.clone()));
                self.params.push(SqlValue::Text(path));
                Ok(format!(
                    "(json_type({source}, ?) IS NULL OR json_type({source}, ?) = 'null')"
                ))
            }
            Value::Bool(flag) => {
                let literal = if *flag { "true" } else { "false" };
                self.scan(field, source, |_, alias| format!("{alias}.type = '{literal}'"))
            }
            Value::Int(_) | Value::Double(_) => {
                let param = scalar_param(field, value)?;
                self.scan(field, source, |translator, alias| {
                    translator.params.push(param);
                    format!("{alias}.type IN ('integer', 'real') AND {alias}.value = ?")
                })
            }
            Value::String(_) | Value::ObjectId(_) => {
                let param = scalar_param(field, value)?;
                self.scan(field, source, |translator, alias| {
                    translator.params.push(param);
                    format!("{alias}.type = 'text' AND {alias}.value = ?")
                })
            }
            Value::Array(_) | Value::Document(_) => Err(StoreError::InvalidQuery(format!(
                "cannot compare `{field}` against a {} value",
                value.type_name()
            ))),
        }
    }

    fn range(&mut self, field: &str, op: &str, value: &Value, source: &str) -> StoreResult<String> {
        let types = match value {
            Value::Int(_) | Value::Double(_) => "IN ('integer', 'real')",
            Value::String(_) | Value::ObjectId(_) => "= 'text'",
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "cannot range-compare `{field}` against a {} value",
                    other.type_name()
                )))
            }
        };
        let param = scalar_param(field, value)?;
        self.scan(field, source, |translator, alias| {
            translator.params.push(param);
            format!("{alias}.type {types} AND {alias}.value {op} ?")
        })
    }

    /// `EXISTS` over the scalar values at `field`, tested by `condition`.
    fn scan<F>(&mut self, field: &str, source: &str, condition: F) -> StoreResult<String>
    where
        F: FnOnce(&mut Self, &str) -> String,
    {
        let path = json_path(field)?;
        let alias = self.alias();
        self.params.push(SqlValue::Text(path.clone()));
        self.params.push(SqlValue::Text(path));
        let condition = condition(self, &alias);
        Ok(format!(
            "EXISTS (SELECT 1 FROM json_each({source}, ?) AS {alias} \
             WHERE json_type({source}, ?) <> 'object' \
             AND {alias}.type NOT IN ('object', 'array') AND {condition})"
        ))
    }
}

fn scalar_param(field: &str, value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Int(number) => Ok(SqlValue::Integer(*number)),
        Value::Double(number) => Ok(SqlValue::Real(*number)),
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::ObjectId(id) => Ok(SqlValue::Text(id.to_hex())),
        other => Err(StoreError::InvalidQuery(format!(
            "cannot bind a {} value for `{field}`",
            other.type_name()
        ))),
    }
}

fn numeric_param(field: &str, value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Int(_) | Value::Double(_) => scalar_param(field, value),
        other => Err(StoreError::InvalidQuery(format!(
            "increment of `{field}` needs a number, got {}",
            other.type_name()
        ))),
    }
}

/// JSON path for a dotted field. Numeric segments index arrays.
pub(crate) fn json_path(field: &str) -> StoreResult<String> {
    let segments = split_path(field).map_err(|err| StoreError::InvalidQuery(err.to_string()))?;
    let mut path = String::from("$");
    for segment in segments {
        if segment.chars().all(|c| c.is_ascii_digit()) {
            path.push_str(&format!("[{segment}]"));
        } else if segment.contains('"') {
            return Err(StoreError::InvalidQuery(format!(
                "field path `{field}` contains a quote"
            )));
        } else {
            path.push_str(&format!(".\"{segment}\""));
        }
    }
    Ok(path)
}
