//! `generateSchemaDiff`: compares a collection's declared
//! constrained fields against the live table's columns (introspected via
//! `PRAGMA table_info`, standing in for the "stored snapshot") and produces
//! an ordered, non-breaking-first DDL plan.

use skibbadb_core::{ColumnType, CollectionDescriptor, ConstrainedFieldDef, Driver, Result, SqlDialect, Value};

use crate::error::MigratorError;

#[derive(Debug, Clone)]
pub struct ExistingColumn {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
}

#[derive(Debug, Default)]
pub struct SchemaDiff {
    pub alters: Vec<String>,
    pub breaking: bool,
    pub breaking_reasons: Vec<String>,
}

const RESERVED_COLUMNS: &[&str] = &["_id", "doc"];

/// `PRAGMA table_info(<table>)`, skipped entirely if the table does not
/// exist yet (a brand-new collection has no prior schema to diff against).
pub fn introspect_columns(driver: &dyn Driver, table: &str) -> Result<Vec<ExistingColumn>> {
    let rows = driver.query(&format!("PRAGMA table_info(\"{table}\")"), &[])?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let name = match row.get("name") {
                Some(Value::Text(n)) => n.clone(),
                _ => return None,
            };
            let sql_type = match row.get("type") {
                Some(Value::Text(t)) => t.clone(),
                _ => String::new(),
            };
            let not_null = matches!(row.get("notnull"), Some(Value::Int(1)));
            Some(ExistingColumn { name, sql_type, not_null })
        })
        .collect())
}

pub fn generate_schema_diff(
    descriptor: &CollectionDescriptor,
    existing: &[ExistingColumn],
    dialect: &dyn SqlDialect,
) -> SchemaDiff {
    let mut diff = SchemaDiff::default();

    if existing.is_empty() {
        // Brand-new table: the installer's CREATE TABLE covers every column.
        return diff;
    }

    for field in &descriptor.constrained_fields {
        match existing.iter().find(|c| c.name == field.column_name()) {
            None => diff
                .alters
                .push(skibbadb_core::ddl::generate_add_column(&descriptor.name, field, dialect)),
            Some(column) => {
                if !types_compatible(column, field) {
                    diff.breaking = true;
                    diff.breaking_reasons.push(format!(
                        "Field '{}' changed type from {} to {}",
                        field.path,
                        column.sql_type,
                        field.ty.sql_name()
                    ));
                }
            }
        }
    }

    let declared: Vec<String> = descriptor.constrained_fields.iter().map(ConstrainedFieldDef::column_name).collect();
    for column in existing {
        if RESERVED_COLUMNS.contains(&column.name.as_str()) {
            continue;
        }
        if !declared.contains(&column.name) {
            diff.breaking = true;
            diff.breaking_reasons.push(format!("Field '{}' was removed", column.name));
        }
    }

    diff
}

fn types_compatible(column: &ExistingColumn, field: &ConstrainedFieldDef) -> bool {
    let declared = field.ty.sql_name();
    column.sql_type.eq_ignore_ascii_case(declared)
        || (field.ty == ColumnType::Boolean && column.sql_type.eq_ignore_ascii_case("INTEGER"))
}

pub fn ensure_non_breaking(collection: &str, diff: &SchemaDiff) -> std::result::Result<(), MigratorError> {
    if diff.breaking {
        return Err(MigratorError::Breaking {
            collection: collection.to_string(),
            reasons: diff.breaking_reasons.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skibbadb_core::{CollectionOptions, SqliteDialect};
    use skibbadb_core::validator::PermissiveValidator;
    use std::sync::Arc;

    fn descriptor_with_fields(fields: Vec<ConstrainedFieldDef>) -> CollectionDescriptor {
        let mut opts = CollectionOptions::new();
        for f in fields {
            opts = opts.field(f);
        }
        CollectionDescriptor::new("users", Arc::new(PermissiveValidator), opts)
    }

    #[test]
    fn new_optional_field_produces_add_column() {
        let descriptor = descriptor_with_fields(vec![
            ConstrainedFieldDef::new("email", ColumnType::Text),
            ConstrainedFieldDef::new("age", ColumnType::Integer),
        ]);
        let existing = vec![ExistingColumn {
            name: "_id".to_string(),
            sql_type: "TEXT".to_string(),
            not_null: true,
        }];
        let dialect = SqliteDialect;
        let diff = generate_schema_diff(&descriptor, &existing, &dialect);
        assert_eq!(diff.alters.len(), 2);
        assert!(!diff.breaking);
    }

    #[test]
    fn removed_field_is_breaking() {
        let descriptor = descriptor_with_fields(vec![ConstrainedFieldDef::new("name", ColumnType::Text)]);
        let existing = vec![
            ExistingColumn { name: "_id".to_string(), sql_type: "TEXT".to_string(), not_null: true },
            ExistingColumn { name: "name".to_string(), sql_type: "TEXT".to_string(), not_null: false },
            ExistingColumn { name: "email".to_string(), sql_type: "TEXT".to_string(), not_null: false },
        ];
        let dialect = SqliteDialect;
        let diff = generate_schema_diff(&descriptor, &existing, &dialect);
        assert!(diff.breaking);
        assert!(diff.breaking_reasons[0].contains("'email' was removed"));
    }

    #[test]
    fn type_change_is_breaking() {
        let descriptor = descriptor_with_fields(vec![ConstrainedFieldDef::new("age", ColumnType::Integer)]);
        let existing = vec![
            ExistingColumn { name: "_id".to_string(), sql_type: "TEXT".to_string(), not_null: true },
            ExistingColumn { name: "age".to_string(), sql_type: "TEXT".to_string(), not_null: false },
        ];
        let dialect = SqliteDialect;
        let diff = generate_schema_diff(&descriptor, &existing, &dialect);
        assert!(diff.breaking);
    }
}
