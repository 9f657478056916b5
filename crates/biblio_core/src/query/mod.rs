//! Backend-neutral query and update expressions.
//!
//! # Responsibility
//! - Describe filters, projections, sorts and partial updates as data.
//! - Evaluate them in process for the document backend (`matcher`).
//! - Translate them into SQLite JSON1 SQL for the session backend (`sql`).
//!
//! # Invariants
//! - `Filter::All` matches every document.
//! - Dotted field paths fan out over arrays when matching.
//! - Updates never touch the backend's identity field.

pub(crate) mod matcher;
pub(crate) mod sql;

use crate::document::{split_path, Value};

/// Tagged filter expression over dotted field paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    #[default]
    All,
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    Exists(String, bool),
    /// Some element of the array at `field` is a document matching the filter.
    ElemMatch(String, Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn all() -> Self {
        Self::All
    }

    /// Field a leaf predicate tests; `None` for `All` and combinators.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Eq(field, _)
            | Self::Ne(field, _)
            | Self::Gt(field, _)
            | Self::Gte(field, _)
            | Self::Lt(field, _)
            | Self::Lte(field, _)
            | Self::In(field, _)
            | Self::Regex { field, .. }
            | Self::Exists(field, _)
            | Self::ElemMatch(field, _) => Some(field),
            Self::All | Self::And(_) | Self::Or(_) | Self::Not(_) => None,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte(field.into(), value.into())
    }

    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: false,
        }
    }

    pub fn regex_ci(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
            case_insensitive: true,
        }
    }

    /// Case-insensitive substring match; `fragment` is matched literally.
    pub fn contains(field: impl Into<String>, fragment: &str) -> Self {
        Self::regex_ci(field, regex::escape(fragment))
    }

    /// Case-insensitive prefix match; `prefix` is matched literally.
    pub fn starts_with(field: impl Into<String>, prefix: &str) -> Self {
        Self::regex_ci(field, format!("^{}", regex::escape(prefix)))
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists(field.into(), true)
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::Exists(field.into(), false)
    }

    pub fn elem_match(field: impl Into<String>, filter: Filter) -> Self {
        Self::ElemMatch(field.into(), Box::new(filter))
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    pub fn negate(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    /// True when the filter cannot exclude any document.
    pub fn is_unconstrained(&self) -> bool {
        match self {
            Self::All => true,
            Self::And(filters) => filters.iter().all(Self::is_unconstrained),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Multi-key sort; earlier keys take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self::default().then_ascending(field)
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self::default().then_descending(field)
    }

    pub fn then_ascending(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Ascending));
        self
    }

    pub fn then_descending(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Descending));
        self
    }

    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionMode {
    Include,
    Exclude,
}

/// Field restriction applied to query results.
///
/// Fields dropped by a projection decode to their zero value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    mode: ProjectionMode,
    fields: Vec<String>,
    include_id: bool,
}

impl Projection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ProjectionMode::Include,
            fields: fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ProjectionMode::Exclude,
            fields: fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    /// Drops the identity from results as well.
    pub fn without_id(mut self) -> Self {
        self.include_id = false;
        self
    }

    pub fn mode(&self) -> ProjectionMode {
        self.mode
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn include_id(&self) -> bool {
        self.include_id
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Option<Sort>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn sorted(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

impl From<Filter> for Query {
    fn from(filter: Filter) -> Self {
        Self::filtered(filter)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set(String, Value),
    Unset(String),
    /// Adds a number; a missing field starts from zero.
    Inc(String, Value),
}

impl UpdateOp {
    pub fn field(&self) -> &str {
        match self {
            Self::Set(field, _) | Self::Unset(field) | Self::Inc(field, _) => field,
        }
    }
}

/// Partial update applied to every matching document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Set(field.into(), value.into()));
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(field.into()));
        self
    }

    pub fn inc(mut self, field: impl Into<String>, delta: impl Into<Value>) -> Self {
        self.ops.push(UpdateOp::Inc(field.into(), delta.into()));
        self
    }

    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Rejects empty updates, malformed paths, writes to `reserved_field`
    /// and non-numeric increments.
    pub(crate) fn validate(&self, reserved_field: &str) -> Result<(), String> {
        if self.ops.is_empty() {
            return Err("update must contain at least one operation".to_string());
        }
        for op in &self.ops {
            let field = op.field();
            split_path(field).map_err(|err| err.to_string())?;
            let root = field.split('.').next().unwrap_or(field);
            if root == reserved_field {
                return Err(format!("update cannot modify identity field `{reserved_field}`"));
            }
            if let UpdateOp::Inc(_, delta) = op {
                if !delta.is_number() {
                    return Err(format!(
                        "increment of `{field}` needs a number, got {}",
                        delta.type_name()
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, Update};

    #[test]
    fn contains_escapes_regex_metacharacters() {
        let filter = Filter::contains("title", "C++ (2nd ed.)");
        assert_eq!(
            filter,
            Filter::regex_ci("title", r"C\+\+ \(2nd ed\.\)")
        );
    }

    #[test]
    fn empty_and_is_unconstrained() {
        assert!(Filter::all().is_unconstrained());
        assert!(Filter::and([]).is_unconstrained());
        assert!(!Filter::or([]).is_unconstrained());
        assert!(!Filter::eq("a", 1).is_unconstrained());
    }

    #[test]
    fn update_validation_guards_identity_and_increments() {
        assert!(Update::new().validate("_id").is_err());
        assert!(Update::new().set("_id", 1).validate("_id").is_err());
        assert!(Update::new().set("_id.part", 1).validate("_id").is_err());
        assert!(Update::new().inc("count", "x").validate("_id").is_err());
        assert!(Update::new().set("a..b", 1).validate("_id").is_err());
        assert!(Update::new()
            .set("nationality", "French")
            .inc("pageCount", 1)
            .validate("_id")
            .is_ok());
    }
}
