use crate::value::Value;

/// Placeholder style for parameterized queries. SQLite uses `?`; kept as an
/// enum (rather than hard-coding `?`) so the compiler stays dialect-neutral
/// even though this workspace ships only the SQLite dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    QuestionMark,
    DollarNumber,
}

/// Database-specific SQL syntax: quoting, escaping, literal formatting.
pub trait SqlDialect: Send + Sync {
    /// Quote an identifier (table/column name).
    fn quote_identifier(&self, name: &str) -> String;

    /// Convert a value to a SQL literal string (used for DDL defaults and
    /// debug-rendering compiled SQL; bound parameters go through the driver).
    fn value_to_literal(&self, value: &Value) -> String;

    /// Escape a string for use inside a single-quoted literal.
    fn escape_string(&self, s: &str) -> String;

    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Whether `json_extract`/`json_each`/`json_array_length` are available.
    fn supports_json_functions(&self) -> bool {
        true
    }
}

/// SQLite dialect: double-quoted identifiers, `?` placeholders.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn value_to_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_nan() || f.is_infinite() {
                    "NULL".to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => format!("'{}'", self.escape_string(s)),
            Value::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("X'{}'", hex)
            }
            Value::DateTime(dt) => format!("'{}'", dt.to_rfc3339()),
        }
    }

    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::QuestionMark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers_and_escapes_embedded_quotes() {
        let dialect = SqliteDialect;
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn formats_text_literal_with_escaping() {
        let dialect = SqliteDialect;
        assert_eq!(
            dialect.value_to_literal(&Value::Text("O'Brien".to_string())),
            "'O''Brien'"
        );
    }
}
