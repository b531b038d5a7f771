//! A single document collection: validates, extracts constrained
//! columns, and round-trips the primary-key field against the physical `_id`
//! column on every read and write.

use std::sync::Arc;

use skibbadb_core::codec::{self, Document};
use skibbadb_core::{
    CollectionDescriptor, Compiler, Driver, Error, QueryBuilder, Registry, Result, Row, SqlDialect,
    Value,
};

use crate::plugin::PluginManager;

pub struct Collection {
    name: String,
    descriptor: Arc<CollectionDescriptor>,
    driver: Arc<dyn Driver>,
    registry: Arc<Registry>,
    plugins: Arc<PluginManager>,
    dialect: Arc<dyn SqlDialect>,
}

impl Collection {
    pub fn new(
        descriptor: Arc<CollectionDescriptor>,
        driver: Arc<dyn Driver>,
        registry: Arc<Registry>,
        plugins: Arc<PluginManager>,
        dialect: Arc<dyn SqlDialect>,
    ) -> Self {
        Collection {
            name: descriptor.name.clone(),
            descriptor,
            driver,
            registry,
            plugins,
            dialect,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &CollectionDescriptor {
        &self.descriptor
    }

    fn validate(&self, doc: &serde_json::Value) -> Result<()> {
        self.descriptor.validator.parse(doc).map(|_| ()).map_err(|issues| {
            let message = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            Error::validation(message)
        })
    }

    fn set_primary_key(&self, doc: &mut serde_json::Value, id: &str) {
        if let Some(obj) = doc.as_object_mut() {
            obj.insert(
                self.descriptor.primary_key_field.clone(),
                serde_json::Value::String(id.to_string()),
            );
        }
    }

    fn primary_key_of(&self, doc: &serde_json::Value) -> Option<String> {
        doc.get(&self.descriptor.primary_key_field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn encode_doc(&self, doc: &serde_json::Value) -> String {
        codec::encode(&Document::from(doc.clone()))
    }

    fn constrained_values(&self, doc: &serde_json::Value) -> Vec<Value> {
        self.descriptor
            .constrained_fields
            .iter()
            .map(|field| Value::from_json_path(doc, &field.path, field.ty))
            .collect()
    }

    fn table(&self) -> String {
        self.dialect.quote_identifier(&self.descriptor.name)
    }

    fn insert_sql(&self) -> String {
        let mut columns = vec!["_id".to_string(), "doc".to_string()];
        columns.extend(self.descriptor.constrained_fields.iter().map(|f| f.column_name()));
        let quoted: Vec<String> = columns.iter().map(|c| self.dialect.quote_identifier(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", self.table(), quoted.join(", "), placeholders)
    }

    /// `INSERT ... ON CONFLICT(_id) DO UPDATE`: one round-trip whether the
    /// row already exists or not.
    fn upsert_sql(&self) -> String {
        let mut columns = vec!["_id".to_string(), "doc".to_string()];
        columns.extend(self.descriptor.constrained_fields.iter().map(|f| f.column_name()));
        let quoted: Vec<String> = columns.iter().map(|c| self.dialect.quote_identifier(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let update_sets: Vec<String> = quoted
            .iter()
            .skip(1)
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            self.table(),
            quoted.join(", "),
            placeholders,
            self.dialect.quote_identifier("_id"),
            update_sets.join(", ")
        )
    }

    fn update_sql(&self) -> String {
        let mut sets = vec![format!("{} = ?", self.dialect.quote_identifier("doc"))];
        sets.extend(
            self.descriptor
                .constrained_fields
                .iter()
                .map(|f| format!("{} = ?", self.dialect.quote_identifier(&f.column_name()))),
        );
        format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table(),
            sets.join(", "),
            self.dialect.quote_identifier("_id")
        )
    }

    fn select_by_id_sql(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE {} = ?",
            self.table(),
            self.dialect.quote_identifier("_id")
        )
    }

    fn delete_by_id_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {} = ?",
            self.table(),
            self.dialect.quote_identifier("_id")
        )
    }

    /// Decode a full-row result (the `doc` column plus any constrained
    /// columns) back into a document, with the primary-key field restored
    /// from `_id`.
    fn row_to_document(&self, row: &Row) -> Result<serde_json::Value> {
        let raw = match row.get("doc") {
            Some(Value::Text(s)) => s.as_str(),
            _ => return Err(Error::database("row is missing its 'doc' column")),
        };
        let document = codec::decode(raw)?;

        let columns: Vec<(String, skibbadb_core::ColumnType, Value)> = self
            .descriptor
            .constrained_fields
            .iter()
            .filter_map(|field| {
                row.get(&field.column_name())
                    .map(|v| (field.path.clone(), field.ty, v.clone()))
            })
            .collect();
        let merged = codec::merge_constrained_columns(document, &columns);

        let mut value: serde_json::Value = merged.into();
        if let (Some(Value::Text(id)), Some(obj)) = (row.get("_id"), value.as_object_mut()) {
            obj.insert(self.descriptor.primary_key_field.clone(), serde_json::Value::String(id.clone()));
        }
        Ok(value)
    }

    /// Renders a row with no `doc` column (a `.select(...)`/aggregate
    /// projection) as a plain JSON object of column name to value.
    fn row_to_projection(row: &Row) -> serde_json::Value {
        serde_json::Value::Object(
            row.columns()
                .iter()
                .map(|(name, value)| (name.clone(), value_to_json(value)))
                .collect(),
        )
    }

    pub fn insert(&self, mut doc: serde_json::Value) -> Result<serde_json::Value> {
        self.plugins.before_insert(&self.name, &mut doc)?;
        self.validate(&doc)?;

        let id = self.primary_key_of(&doc).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.set_primary_key(&mut doc, &id);

        let encoded = self.encode_doc(&doc);
        let mut params = vec![Value::Text(id), Value::Text(encoded)];
        params.extend(self.constrained_values(&doc));

        self.driver.exec(&self.insert_sql(), &params)?;
        self.plugins.after_insert(&self.name, &doc)?;
        Ok(doc)
    }

    pub fn insert_bulk(&self, docs: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>> {
        let mut pending = docs;
        let mut inserted = Vec::with_capacity(pending.len());
        self.driver.transaction(&mut || {
            for doc in pending.drain(..) {
                inserted.push(self.insert(doc)?);
            }
            Ok(())
        })?;
        Ok(inserted)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<serde_json::Value>> {
        self.plugins.before_query(&self.name)?;
        let rows = self.driver.query(&self.select_by_id_sql(), &[Value::Text(id.to_string())])?;
        let found = match rows.first() {
            Some(row) => Some(self.row_to_document(row)?),
            None => None,
        };
        self.plugins.after_query(&self.name)?;
        Ok(found)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.find_by_id(id)?.is_some())
    }

    /// Replaces the document stored at `id` in full. Fails with
    /// [`Error::NotFound`] if no row has that id.
    pub fn put(&self, id: &str, mut doc: serde_json::Value) -> Result<serde_json::Value> {
        self.plugins.before_update(&self.name, &mut doc)?;
        self.validate(&doc)?;
        self.set_primary_key(&mut doc, id);

        let encoded = self.encode_doc(&doc);
        let mut params = vec![Value::Text(encoded)];
        params.extend(self.constrained_values(&doc));
        params.push(Value::Text(id.to_string()));

        let affected = self.driver.exec(&self.update_sql(), &params)?;
        if affected == 0 {
            return Err(Error::not_found(format!("{} '{}'", self.name, id)));
        }
        self.plugins.after_update(&self.name, &doc)?;
        Ok(doc)
    }

    pub fn put_bulk(&self, docs: Vec<(String, serde_json::Value)>) -> Result<Vec<serde_json::Value>> {
        let mut pending = docs;
        let mut updated = Vec::with_capacity(pending.len());
        self.driver.transaction(&mut || {
            for (id, doc) in pending.drain(..) {
                updated.push(self.put(&id, doc)?);
            }
            Ok(())
        })?;
        Ok(updated)
    }

    /// Inserts a new document, or replaces the existing one if its primary
    /// key already names a stored row, in one `INSERT ... ON CONFLICT DO
    /// UPDATE` statement. The existence probe below picks which hook pair
    /// (`before/afterInsert` vs. `before/afterUpdate`) to fire and is not
    /// used to choose between two separate write statements.
    pub fn upsert(&self, mut doc: serde_json::Value) -> Result<serde_json::Value> {
        let probed_id = self.primary_key_of(&doc);
        let existed = match &probed_id {
            Some(id) => self.exists(id)?,
            None => false,
        };

        if existed {
            self.plugins.before_update(&self.name, &mut doc)?;
        } else {
            self.plugins.before_insert(&self.name, &mut doc)?;
        }
        self.validate(&doc)?;

        let id = probed_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.set_primary_key(&mut doc, &id);

        let encoded = self.encode_doc(&doc);
        let mut params = vec![Value::Text(id), Value::Text(encoded)];
        params.extend(self.constrained_values(&doc));

        self.driver.exec(&self.upsert_sql(), &params)?;

        if existed {
            self.plugins.after_update(&self.name, &doc)?;
        } else {
            self.plugins.after_insert(&self.name, &doc)?;
        }
        Ok(doc)
    }

    pub fn upsert_bulk(&self, docs: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>> {
        let mut pending = docs;
        let mut results = Vec::with_capacity(pending.len());
        self.driver.transaction(&mut || {
            for doc in pending.drain(..) {
                results.push(self.upsert(doc)?);
            }
            Ok(())
        })?;
        Ok(results)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.plugins.before_delete(&self.name, id)?;
        let affected = self.driver.exec(&self.delete_by_id_sql(), &[Value::Text(id.to_string())])?;
        self.plugins.after_delete(&self.name, id)?;
        Ok(affected > 0)
    }

    pub fn delete_bulk(&self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0usize;
        self.driver.transaction(&mut || {
            for id in ids {
                if self.delete(id)? {
                    deleted += 1;
                }
            }
            Ok(())
        })?;
        Ok(deleted)
    }

    fn compiler(&self) -> Compiler<'_> {
        Compiler::new(self.dialect.as_ref(), &self.descriptor).with_registry(&self.registry)
    }

    pub fn count(&self, qb: &QueryBuilder) -> Result<i64> {
        self.plugins.before_query(&self.name)?;
        let compiled = self.compiler().compile_count(qb, None);
        let rows = self.driver.query(&compiled.sql, &compiled.params)?;
        self.plugins.after_query(&self.name)?;
        Ok(rows
            .first()
            .and_then(|row| row.columns().first())
            .map(|(_, value)| match value {
                Value::Int(i) => *i,
                Value::Float(f) => *f as i64,
                _ => 0,
            })
            .unwrap_or(0))
    }

    pub fn to_array(&self, qb: &QueryBuilder) -> Result<Vec<serde_json::Value>> {
        self.plugins.before_query(&self.name)?;
        let compiled = self.compiler().compile(qb);
        let rows = self.driver.query(&compiled.sql, &compiled.params)?;
        let projected = qb.select.is_some() || !qb.aggregates.is_empty();

        let docs = rows
            .iter()
            .map(|row| {
                if projected {
                    Ok(Self::row_to_projection(row))
                } else {
                    self.row_to_document(row)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        self.plugins.after_query(&self.name)?;
        Ok(docs)
    }

    pub fn first(&self, qb: &QueryBuilder) -> Result<Option<serde_json::Value>> {
        let limited = qb.clone().limit(1);
        let mut results = self.to_array(&limited)?;
        Ok(if results.is_empty() { None } else { Some(results.remove(0)) })
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
    }
}
