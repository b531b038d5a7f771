//! Small builders for the [`Row`]/[`Value`] shapes tests assemble by hand.

use skibbadb_core::{Row, Value};

pub fn row(columns: Vec<(&str, Value)>) -> Row {
    Row::new(columns.into_iter().map(|(name, value)| (name.to_string(), value)).collect())
}

pub fn doc_row(id: impl Into<String>, json: impl Into<String>) -> Row {
    row(vec![
        ("_id", Value::Text(id.into())),
        ("doc", Value::Text(json.into())),
    ])
}

pub fn sample_document(name: &str, age: i64) -> serde_json::Value {
    serde_json::json!({ "name": name, "age": age })
}
