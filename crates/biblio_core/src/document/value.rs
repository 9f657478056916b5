use super::{Document, ObjectId};
use std::cmp::Ordering;

const OID_KEY: &str = "$oid";

/// Typed value stored inside a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    Array(Vec<Value>),
    Document(Document),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::ObjectId(_) => "objectId",
            Self::Array(_) => "array",
            Self::Document(_) => "document",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Double(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Integer view; integral doubles are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Double(value)
                if value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value <= i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object_id(&self) -> Option<ObjectId> {
        match self {
            Self::ObjectId(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Equality used by query matching: numbers compare by value across
    /// `Int` and `Double`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Int(left), Self::Int(right)) => left == right,
            (left, right) if left.is_number() && right.is_number() => {
                left.as_f64() == right.as_f64()
            }
            (left, right) => left == right,
        }
    }

    /// Rank of the value's type in the cross-type sort order.
    pub(crate) fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 1,
            Self::Int(_) | Self::Double(_) => 2,
            Self::String(_) => 3,
            Self::Document(_) => 4,
            Self::Array(_) => 5,
            Self::ObjectId(_) => 7,
            Self::Bool(_) => 8,
        }
    }

    /// Total order used for sorting: first by type rank, then by value.
    pub fn canonical_cmp(&self, other: &Value) -> Ordering {
        let rank = self.type_rank().cmp(&other.type_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        match (self, other) {
            (Self::Int(left), Self::Int(right)) => left.cmp(right),
            (left, right) if left.is_number() => {
                let left = left.as_f64().unwrap_or(f64::NAN);
                let right = right.as_f64().unwrap_or(f64::NAN);
                left.partial_cmp(&right).unwrap_or(Ordering::Equal)
            }
            (Self::String(left), Self::String(right)) => left.cmp(right),
            (Self::ObjectId(left), Self::ObjectId(right)) => left.cmp(right),
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Array(left), Self::Array(right)) => compare_sequences(left.iter(), right.iter()),
            (Self::Document(left), Self::Document(right)) => {
                for ((left_key, left_value), (right_key, right_value)) in left.iter().zip(right.iter())
                {
                    let ordering = left_key
                        .cmp(right_key)
                        .then_with(|| left_value.canonical_cmp(right_value));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                left.len().cmp(&right.len())
            }
            _ => Ordering::Equal,
        }
    }

    /// Extended JSON form. Non-finite doubles have no JSON form and
    /// become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(value) => serde_json::Value::Bool(*value),
            Self::Int(value) => serde_json::Value::from(*value),
            Self::Double(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(text) => serde_json::Value::String(text.clone()),
            Self::ObjectId(id) => {
                let mut map = serde_json::Map::new();
                map.insert(OID_KEY.to_string(), serde_json::Value::String(id.to_hex()));
                serde_json::Value::Object(map)
            }
            Self::Array(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Document(doc) => doc.to_json(),
        }
    }

    /// Plain JSON form: object ids become their hex strings.
    pub fn to_plain_json(&self) -> serde_json::Value {
        match self {
            Self::ObjectId(id) => serde_json::Value::String(id.to_hex()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_plain_json).collect())
            }
            Self::Document(doc) => serde_json::Value::Object(
                doc.iter()
                    .map(|(key, value)| (key.to_string(), value.to_plain_json()))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(value) => Self::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Self::Int(value),
                None => number.as_f64().map_or(Self::Null, Self::Double),
            },
            serde_json::Value::String(text) => Self::String(text),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(id) = extended_object_id(&map) {
                    return Self::ObjectId(id);
                }
                Self::Document(Document::from_json_map(map))
            }
        }
    }
}

fn extended_object_id(map: &serde_json::Map<String, serde_json::Value>) -> Option<ObjectId> {
    if map.len() != 1 {
        return None;
    }
    let hex = map.get(OID_KEY)?.as_str()?;
    ObjectId::parse_str(hex).ok()
}

fn compare_sequences<'a>(
    mut left: impl Iterator<Item = &'a Value>,
    mut right: impl Iterator<Item = &'a Value>,
) -> Ordering {
    loop {
        match (left.next(), right.next()) {
            (Some(l), Some(r)) => {
                let ordering = l.canonical_cmp(r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Self::ObjectId(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Self::Document(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::Value;
    use crate::document::{Document, ObjectId};
    use std::cmp::Ordering;

    #[test]
    fn numbers_compare_across_int_and_double() {
        assert!(Value::Int(3).loosely_equals(&Value::Double(3.0)));
        assert!(!Value::Int(3).loosely_equals(&Value::String("3".into())));
        assert_eq!(Value::Int(2).canonical_cmp(&Value::Double(2.5)), Ordering::Less);
    }

    #[test]
    fn cross_type_order_puts_null_first_and_bool_last() {
        let mut values = vec![
            Value::Bool(false),
            Value::String("a".into()),
            Value::Int(10),
            Value::Null,
            Value::ObjectId(ObjectId::new()),
        ];
        values.sort_by(Value::canonical_cmp);

        let names: Vec<&str> = values.iter().map(Value::type_name).collect();
        assert_eq!(names, vec!["null", "int", "string", "objectId", "bool"]);
    }

    #[test]
    fn oid_object_with_extra_keys_stays_a_document() {
        let json = serde_json::json!({"$oid": "507f1f77bcf86cd799439011", "x": 1});
        assert!(matches!(Value::from_json(json), Value::Document(_)));
    }

    #[test]
    fn plain_json_flattens_object_ids() {
        let id = ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap();
        let doc = Value::Document(Document::new().with("ref", id));
        assert_eq!(
            doc.to_plain_json(),
            serde_json::json!({"ref": "507f1f77bcf86cd799439011"})
        );
    }

    #[test]
    fn integral_doubles_read_as_integers() {
        assert_eq!(Value::Double(42.0).as_i64(), Some(42));
        assert_eq!(Value::Double(4.2).as_i64(), None);
    }
}
