//! Translates `rusqlite` failures into the engine's own error taxonomy.

use rusqlite::ErrorCode;
use skibbadb_core::Error;

/// Map a `rusqlite::Error` from an exec/query call into a [`skibbadb_core::Error`].
pub fn classify(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(sqlite_err, message) => match sqlite_err.code {
            ErrorCode::ConstraintViolation => {
                let text = message.clone().unwrap_or_default();
                if text.contains("UNIQUE") || text.contains("PRIMARY KEY") {
                    Error::unique_constraint(extract_unique_fields(&text))
                } else if text.contains("FOREIGN KEY") {
                    Error::validation("foreign key constraint violation")
                } else if text.contains("NOT NULL") {
                    Error::validation(
                        extract_not_null_field(&text)
                            .map(|f| format!("{f} must not be null"))
                            .unwrap_or_else(|| "NOT NULL constraint failed".to_string()),
                    )
                } else {
                    Error::validation(text)
                }
            }
            _ => Error::database(message.clone().unwrap_or_else(|| err.to_string())),
        },
        other => Error::database(other.to_string()),
    }
}

/// `rusqlite` formats unique violations as `UNIQUE constraint failed: table.col, table.col2`.
fn extract_unique_fields(message: &str) -> Vec<String> {
    message
        .split(':')
        .nth(1)
        .map(|rest| {
            rest.split(',')
                .filter_map(|entry| entry.trim().split('.').next_back())
                .map(|field| field.trim().to_string())
                .filter(|field| !field.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// `rusqlite` formats NOT NULL violations as `NOT NULL constraint failed: table.col`.
fn extract_not_null_field(message: &str) -> Option<String> {
    message
        .split(':')
        .nth(1)
        .and_then(|rest| rest.trim().split('.').next_back())
        .map(|field| field.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_unique_field() {
        let fields = extract_unique_fields(" constraint failed: users.email");
        assert_eq!(fields, vec!["email".to_string()]);
    }

    #[test]
    fn extracts_composite_unique_fields() {
        let fields = extract_unique_fields(" constraint failed: orders.tenant_id, orders.sku");
        assert_eq!(fields, vec!["tenant_id".to_string(), "sku".to_string()]);
    }
}
