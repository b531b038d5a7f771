use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// SQL type of a constrained column (`ConstrainedFieldDef.ty`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
    Blob,
    Vector,
}

impl ColumnType {
    /// The literal SQL type name emitted in `CREATE TABLE`/`ALTER TABLE` DDL.
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Boolean => "INTEGER",
            ColumnType::Blob => "BLOB",
            ColumnType::Vector => "BLOB",
        }
    }
}

/// A value bound as a constrained-column projection or a query parameter.
///
/// Distinct from `serde_json::Value`: this enum only carries the primitives a
/// SQL column can hold, so the query compiler and DDL generator never need to
/// reason about nested JSON shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extract a constrained-column value out of a decoded document at a
    /// (possibly dotted) JSON path, coercing it to the declared column type.
    pub fn from_json_path(doc: &serde_json::Value, path: &str, ty: ColumnType) -> Value {
        let mut cursor = doc;
        for segment in path.split('.') {
            match cursor.get(segment) {
                Some(next) => cursor = next,
                None => return Value::Null,
            }
        }
        Value::from_json_typed(cursor, ty)
    }

    fn from_json_typed(value: &serde_json::Value, ty: ColumnType) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match ty {
            ColumnType::Boolean => Value::Bool(value.as_bool().unwrap_or(false)),
            ColumnType::Integer => value
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| Value::from_json(value)),
            ColumnType::Real => value
                .as_f64()
                .map(Value::Float)
                .unwrap_or_else(|| Value::from_json(value)),
            ColumnType::Blob | ColumnType::Vector => match value.as_str() {
                Some(s) => Value::Blob(s.as_bytes().to_vec()),
                None => Value::Text(value.to_string()),
            },
            ColumnType::Text => match value.as_str() {
                Some(s) => Value::Text(s.to_string()),
                None => Value::Text(value.to_string()),
            },
        }
    }

    fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            (Blob(a), Blob(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            _ => type_order(self).cmp(&type_order(other)),
        }
    }
}

fn type_order(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Int(_) => 1,
        Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::DateTime(_) => 4,
        Value::Blob(_) => 5,
        Value::Null => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_dotted_path() {
        let doc = json!({"address": {"city": "Berlin"}});
        let value = Value::from_json_path(&doc, "address.city", ColumnType::Text);
        assert_eq!(value, Value::Text("Berlin".to_string()));
    }

    #[test]
    fn missing_path_is_null() {
        let doc = json!({"name": "Jo"});
        let value = Value::from_json_path(&doc, "age", ColumnType::Integer);
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![Value::Int(2), Value::Null, Value::Int(1)];
        values.sort();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Null]);
    }
}
