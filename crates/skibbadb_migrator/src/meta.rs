//! The `_skibbadb_migrations` meta table: tracks each collection's stored
//! schema version and a schema-shape fingerprint used to short-circuit
//! diffing when nothing changed.

use chrono::Utc;
use sha2::{Digest, Sha256};
use skibbadb_core::{CollectionDescriptor, Driver, Result, Value};

const META_TABLE: &str = "_skibbadb_migrations";

pub fn initialize_migrations_table(driver: &dyn Driver) -> Result<()> {
    driver.exec(
        &format!(
            "CREATE TABLE IF NOT EXISTS {META_TABLE} (
                collection TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                appliedAt TEXT NOT NULL,
                schemaHash TEXT
            )"
        ),
        &[],
    )?;
    Ok(())
}

pub fn get_stored_version(driver: &dyn Driver, collection: &str) -> Result<u32> {
    let rows = driver.query(
        &format!("SELECT version FROM {META_TABLE} WHERE collection = ?"),
        &[Value::Text(collection.to_string())],
    )?;
    Ok(match rows.first().and_then(|r| r.get("version")) {
        Some(Value::Int(v)) => (*v).max(0) as u32,
        _ => 0,
    })
}

pub fn get_stored_schema_hash(driver: &dyn Driver, collection: &str) -> Result<Option<String>> {
    let rows = driver.query(
        &format!("SELECT schemaHash FROM {META_TABLE} WHERE collection = ?"),
        &[Value::Text(collection.to_string())],
    )?;
    Ok(match rows.first().and_then(|r| r.get("schemaHash")) {
        Some(Value::Text(hash)) => Some(hash.clone()),
        _ => None,
    })
}

pub fn record_version(driver: &dyn Driver, collection: &str, version: u32, schema_hash: &str) -> Result<()> {
    driver.exec(
        &format!(
            "INSERT INTO {META_TABLE} (collection, version, appliedAt, schemaHash)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(collection) DO UPDATE SET version = excluded.version,
                appliedAt = excluded.appliedAt, schemaHash = excluded.schemaHash"
        ),
        &[
            Value::Text(collection.to_string()),
            Value::Int(version as i64),
            Value::Text(Utc::now().to_rfc3339()),
            Value::Text(schema_hash.to_string()),
        ],
    )?;
    Ok(())
}

/// Fingerprint of a collection's declared constrained-field shape. Compared
/// against the stored `schemaHash` on every `migrate_collection` call so an
/// unchanged schema skips `introspect_columns`/`generate_schema_diff`
/// entirely; a mismatch (or no stored hash yet) falls back to introspecting
/// the live table.
pub fn fingerprint(descriptor: &CollectionDescriptor) -> String {
    let mut hasher = Sha256::new();
    for field in &descriptor.constrained_fields {
        hasher.update(field.path.as_bytes());
        hasher.update([field.ty.sql_name().as_bytes(), &[field.nullable as u8, field.unique as u8]].concat());
    }
    hex::encode(hasher.finalize())
}
