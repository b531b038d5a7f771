//! Document codec: JSON encode/decode with a typed envelope for dates.
//!
//! `serde_json::Value` has no native date variant, so documents are built and
//! walked as [`Document`], a JSON-shaped tree that adds a `Date` leaf. On the
//! wire (and at rest in the `doc` column) a `Date` leaf is the envelope
//! `{"__type":"Date","value":"<ISO-8601 UTC>"}`; in memory it round-trips
//! through `chrono::DateTime<Utc>`.

use crate::value::{ColumnType, Value};
use chrono::{DateTime, Utc};
use serde_json::{Map, Number};
use std::collections::BTreeMap;

const DATE_TYPE_TAG: &str = "__type";
const DATE_TYPE_VALUE: &str = "Date";
const DATE_VALUE_KEY: &str = "value";

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Document>),
    Object(BTreeMap<String, Document>),
}

impl Document {
    pub fn object(fields: impl IntoIterator<Item = (String, Document)>) -> Self {
        Document::Object(fields.into_iter().collect())
    }

    pub fn get_path(&self, path: &str) -> Option<&Document> {
        let mut cursor = self;
        for segment in path.split('.') {
            match cursor {
                Document::Object(map) => cursor = map.get(segment)?,
                _ => return None,
            }
        }
        Some(cursor)
    }

    /// Set (or insert) the value at a dotted path, creating intermediate
    /// objects as needed. Used to merge constrained columns back in.
    pub fn set_path(&mut self, path: &str, value: Document) {
        let mut segments = path.split('.').peekable();
        let mut cursor = self;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                if let Document::Object(map) = cursor {
                    map.insert(segment.to_string(), value);
                }
                return;
            }
            if !matches!(cursor, Document::Object(_)) {
                *cursor = Document::Object(BTreeMap::new());
            }
            let Document::Object(map) = cursor else {
                unreachable!()
            };
            cursor = map
                .entry(segment.to_string())
                .or_insert_with(|| Document::Object(BTreeMap::new()));
        }
    }

    /// Convert a column value (as read back from SQLite) into a document leaf
    /// of the given declared column type, so dates round-trip as envelopes.
    pub fn from_column(value: &Value, ty: ColumnType) -> Document {
        match (value, ty) {
            (Value::Null, _) => Document::Null,
            (Value::Bool(b), _) => Document::Bool(*b),
            (Value::Int(i), ColumnType::Boolean) => Document::Bool(*i != 0),
            (Value::Int(i), _) => Document::Number(Number::from(*i)),
            (Value::Float(f), _) => Number::from_f64(*f).map(Document::Number).unwrap_or(Document::Null),
            (Value::Text(s), _) => Document::String(s.clone()),
            (Value::Blob(b), _) => Document::String(String::from_utf8_lossy(b).into_owned()),
            (Value::DateTime(dt), _) => Document::Date(*dt),
        }
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Document::Null,
            serde_json::Value::Bool(b) => Document::Bool(b),
            serde_json::Value::Number(n) => Document::Number(n),
            serde_json::Value::String(s) => Document::String(s),
            serde_json::Value::Array(items) => {
                Document::Array(items.into_iter().map(Document::from).collect())
            }
            serde_json::Value::Object(map) => {
                if let Some(envelope_date) = date_from_envelope(&map) {
                    return Document::Date(envelope_date);
                }
                Document::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, Document::from(v)))
                        .collect(),
                )
            }
        }
    }
}

impl From<Document> for serde_json::Value {
    fn from(doc: Document) -> Self {
        match doc {
            Document::Null => serde_json::Value::Null,
            Document::Bool(b) => serde_json::Value::Bool(b),
            Document::Number(n) => serde_json::Value::Number(n),
            Document::String(s) => serde_json::Value::String(s),
            Document::Date(dt) => date_envelope(dt),
            Document::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Document::Object(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

fn date_envelope(dt: DateTime<Utc>) -> serde_json::Value {
    let mut map = Map::new();
    map.insert(
        DATE_TYPE_TAG.to_string(),
        serde_json::Value::String(DATE_TYPE_VALUE.to_string()),
    );
    map.insert(
        DATE_VALUE_KEY.to_string(),
        serde_json::Value::String(dt.to_rfc3339()),
    );
    serde_json::Value::Object(map)
}

fn date_from_envelope(map: &Map<String, serde_json::Value>) -> Option<DateTime<Utc>> {
    let tag = map.get(DATE_TYPE_TAG)?.as_str()?;
    if tag != DATE_TYPE_VALUE {
        return None;
    }
    let raw = map.get(DATE_VALUE_KEY)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Encode a document to its canonical JSON string (the `doc` column's
/// contents), lowering `Date` leaves to envelopes.
pub fn encode(doc: &Document) -> String {
    serde_json::to_string(&serde_json::Value::from(doc.clone()))
        .expect("document serialization is infallible for JSON-safe values")
}

/// Decode a `doc` column string back into a [`Document`], rehydrating any
/// Date envelopes.
pub fn decode(raw: &str) -> crate::error::Result<Document> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| crate::error::Error::database(format!("invalid document JSON: {e}")))?;
    Ok(Document::from(value))
}

/// Overlay constrained-column values onto a decoded document. For each
/// constrained path present in `columns`, the column value overrides the
/// document's value at that path, even when the column is null.
pub fn merge_constrained_columns(
    mut doc: Document,
    columns: &[(String, ColumnType, Value)],
) -> Document {
    for (path, ty, value) in columns {
        doc.set_path(path, Document::from_column(value, *ty));
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_date_envelope() {
        let dt = DateTime::parse_from_rfc3339("2024-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let doc = Document::object([("createdAt".to_string(), Document::Date(dt))]);

        let encoded = encode(&doc);
        assert!(encoded.contains("\"__type\":\"Date\""));

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn round_trips_plain_json() {
        let value: serde_json::Value = json!({"name": "Ada", "tags": ["a", "b"], "age": 30});
        let doc = Document::from(value.clone());
        let decoded = decode(&encode(&doc)).unwrap();
        assert_eq!(decoded, doc);
        let back: serde_json::Value = decoded.into();
        assert_eq!(back, value);
    }

    #[test]
    fn merge_overrides_document_path() {
        let doc = Document::from(json!({"name": "Ada", "email": "old@x"}));
        let merged = merge_constrained_columns(
            doc,
            &[(
                "email".to_string(),
                ColumnType::Text,
                Value::Text("new@x".to_string()),
            )],
        );
        assert_eq!(merged.get_path("email"), Some(&Document::String("new@x".to_string())));
    }

    #[test]
    fn merge_creates_nested_path() {
        let doc = Document::from(json!({"name": "Ada"}));
        let merged = merge_constrained_columns(
            doc,
            &[(
                "address.city".to_string(),
                ColumnType::Text,
                Value::Text("Berlin".to_string()),
            )],
        );
        assert_eq!(
            merged.get_path("address.city"),
            Some(&Document::String("Berlin".to_string()))
        );
    }
}
