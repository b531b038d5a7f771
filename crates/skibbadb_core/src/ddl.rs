//! The constraint and index installer: turns a
//! [`CollectionDescriptor`] into the DDL statements that create its backing
//! table, column constraints, and indexes.

use crate::schema::{CollectionDescriptor, ConstrainedFieldDef, IndexDef};
use crate::sql_dialect::SqlDialect;

/// A fully-rendered installation plan: one `CREATE TABLE` followed by zero or
/// more `CREATE INDEX` statements. Installation is idempotent: every
/// statement uses `IF NOT EXISTS`.
pub struct InstallPlan {
    pub create_table: String,
    pub create_indexes: Vec<String>,
}

pub fn build_install_plan(descriptor: &CollectionDescriptor, dialect: &dyn SqlDialect) -> InstallPlan {
    InstallPlan {
        create_table: generate_create_table(descriptor, dialect),
        create_indexes: generate_indexes(descriptor, dialect),
    }
}

/// `CREATE TABLE IF NOT EXISTS <name> (_id TEXT PRIMARY KEY, doc TEXT NOT
/// NULL, <constrained columns>)`.
pub fn generate_create_table(descriptor: &CollectionDescriptor, dialect: &dyn SqlDialect) -> String {
    let table = dialect.quote_identifier(&descriptor.name);
    let mut columns = vec!["_id TEXT PRIMARY KEY".to_string(), "doc TEXT NOT NULL".to_string()];

    for field in &descriptor.constrained_fields {
        columns.push(render_column(field, dialect));
    }

    for group in &descriptor.composite_unique {
        let quoted: Vec<String> = group.iter().map(|c| dialect.quote_identifier(c)).collect();
        columns.push(format!("UNIQUE({})", quoted.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table,
        columns.join(",\n    ")
    )
}

fn render_column(field: &ConstrainedFieldDef, dialect: &dyn SqlDialect) -> String {
    let mut parts = vec![dialect.quote_identifier(&field.column_name()), field.ty.sql_name().to_string()];

    if !field.nullable {
        parts.push("NOT NULL".to_string());
    }
    if field.unique {
        parts.push("UNIQUE".to_string());
    }
    if let Some(check) = &field.check_constraint {
        parts.push(format!("CHECK ({})", check));
    }
    if let Some(fk) = &field.foreign_key {
        parts.push(format!(
            "REFERENCES {}({}) ON DELETE {} ON UPDATE {}",
            dialect.quote_identifier(&fk.table),
            dialect.quote_identifier(&fk.field),
            field.on_delete.sql_name(),
            field.on_update.sql_name(),
        ));
    }

    parts.join(" ")
}

/// Indexes for every constrained field marked `indexed`, plus any explicit
/// [`IndexDef`]s declared in collection options. Dotted fields become
/// expression indexes on `json_extract(doc, '$.a.b')`.
pub fn generate_indexes(descriptor: &CollectionDescriptor, dialect: &dyn SqlDialect) -> Vec<String> {
    let table = dialect.quote_identifier(&descriptor.name);
    let mut statements = Vec::new();

    for field in &descriptor.constrained_fields {
        if !field.indexed {
            continue;
        }
        let index_name = format!("idx_{}_{}", descriptor.name, field.column_name());
        let target = if field.is_dotted() {
            json_extract_expr(&field.path)
        } else {
            dialect.quote_identifier(&field.column_name())
        };
        let unique = if field.unique { "UNIQUE " } else { "" };
        statements.push(format!(
            "CREATE {unique}INDEX IF NOT EXISTS {} ON {} ({})",
            index_name, table, target
        ));
    }

    for index in &descriptor.indexes {
        statements.push(render_named_index(&descriptor.name, index, dialect));
    }

    statements
}

fn render_named_index(table_name: &str, index: &IndexDef, dialect: &dyn SqlDialect) -> String {
    let table = dialect.quote_identifier(table_name);
    let targets: Vec<String> = index
        .fields
        .iter()
        .map(|path| {
            if path.contains('.') {
                json_extract_expr(path)
            } else {
                dialect.quote_identifier(path)
            }
        })
        .collect();

    let unique = if index.unique { "UNIQUE " } else { "" };
    let mut sql = format!(
        "CREATE {unique}INDEX IF NOT EXISTS {} ON {} ({})",
        index.name,
        table,
        targets.join(", ")
    );
    if let Some(clause) = &index.where_clause {
        sql.push_str(&format!(" WHERE {}", clause));
    }
    sql
}

/// `json_extract(doc, '$.a.b')` for a dotted path `a.b`.
pub fn json_extract_expr(path: &str) -> String {
    format!("json_extract(doc, '$.{}')", path)
}

/// `ALTER TABLE <t> ADD COLUMN <f> <sqltype>` for migrator non-breaking
/// schema diffs.
pub fn generate_add_column(table: &str, field: &ConstrainedFieldDef, dialect: &dyn SqlDialect) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.quote_identifier(table),
        render_column(field, dialect)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionOptions, ForeignKeyAction};
    use crate::sql_dialect::SqliteDialect;
    use crate::validator::PermissiveValidator;
    use crate::value::ColumnType;
    use std::sync::Arc;

    fn descriptor() -> CollectionDescriptor {
        let opts = CollectionOptions::new()
            .field(
                crate::schema::ConstrainedFieldDef::new("email", ColumnType::Text)
                    .not_null()
                    .unique()
                    .indexed(),
            )
            .field(
                crate::schema::ConstrainedFieldDef::new("address.city", ColumnType::Text).indexed(),
            );
        CollectionDescriptor::new("users", Arc::new(PermissiveValidator), opts)
    }

    #[test]
    fn create_table_includes_id_doc_and_constrained_columns() {
        let dialect = SqliteDialect;
        let sql = generate_create_table(&descriptor(), &dialect);
        assert!(sql.contains("_id TEXT PRIMARY KEY"));
        assert!(sql.contains("doc TEXT NOT NULL"));
        assert!(sql.contains("\"email\" TEXT NOT NULL UNIQUE"));
        assert!(sql.contains("\"address_city\" TEXT"));
    }

    #[test]
    fn dotted_field_gets_expression_index() {
        let dialect = SqliteDialect;
        let indexes = generate_indexes(&descriptor(), &dialect);
        assert!(
            indexes
                .iter()
                .any(|sql| sql.contains("json_extract(doc, '$.address.city')"))
        );
    }

    #[test]
    fn foreign_key_clause_includes_actions() {
        let field = crate::schema::ConstrainedFieldDef::new("authorId", ColumnType::Text)
            .references("users._id", ForeignKeyAction::Cascade);
        let dialect = SqliteDialect;
        let rendered = render_column(&field, &dialect);
        assert!(rendered.contains("REFERENCES \"users\"(\"_id\") ON DELETE CASCADE ON UPDATE NO ACTION"));
    }

    #[test]
    fn composite_unique_becomes_table_level_constraint() {
        let opts = CollectionOptions::new().composite_unique(&["tenant_id", "slug"]);
        let descriptor = CollectionDescriptor::new("pages", Arc::new(PermissiveValidator), opts);
        let dialect = SqliteDialect;
        let sql = generate_create_table(&descriptor, &dialect);
        assert!(sql.contains("UNIQUE(\"tenant_id\", \"slug\")"));
    }
}
