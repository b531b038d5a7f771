//! The runtime schema validator abstraction: a collection's validator is a
//! value handed in at registration time, not a compile-time type.

use crate::value::ColumnType;

/// One field in a validator's introspection view, consumed by the migrator's
/// diff algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub path: String,
    pub sql_type: ColumnType,
    pub nullable: bool,
    /// True when the field carries a `.int()`-style refinement, used by the
    /// migrator to distinguish REAL from INTEGER for numeric fields.
    pub is_integer_refinement: bool,
}

/// A document validation error: a single (path, message) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Abstract document validator. Implementations may wrap a schema library
/// (see the optional `jsonschema` feature) or hand-roll field checks.
pub trait Validator: Send + Sync {
    /// Validate a document, returning the (possibly normalized) value or the
    /// collected issues.
    fn parse(&self, value: &serde_json::Value) -> Result<serde_json::Value, Vec<ValidationIssue>>;

    /// The declared shape, used by the migrator to diff against the stored
    /// snapshot. Empty for validators that don't support introspection.
    fn schema_fields(&self) -> Vec<SchemaField> {
        Vec::new()
    }
}

/// A validator that accepts any JSON-safe document unconditionally. Used as
/// the default when a collection declares no schema, and in tests.
pub struct PermissiveValidator;

impl Validator for PermissiveValidator {
    fn parse(&self, value: &serde_json::Value) -> Result<serde_json::Value, Vec<ValidationIssue>> {
        Ok(value.clone())
    }
}

/// A validator built from a fixed list of field rules: a minimal hand-rolled
/// alternative to the JSON-Schema-backed validator for callers who don't want
/// the extra dependency.
pub struct FieldValidator {
    fields: Vec<FieldRule>,
}

pub struct FieldRule {
    pub path: String,
    pub sql_type: ColumnType,
    pub required: bool,
    pub is_integer_refinement: bool,
}

impl FieldValidator {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self { fields }
    }
}

impl Validator for FieldValidator {
    fn parse(&self, value: &serde_json::Value) -> Result<serde_json::Value, Vec<ValidationIssue>> {
        let mut issues = Vec::new();
        for rule in &self.fields {
            let found = value.get(&rule.path);
            match found {
                None | Some(serde_json::Value::Null) if rule.required => {
                    issues.push(ValidationIssue {
                        path: rule.path.clone(),
                        message: "required field is missing".to_string(),
                    });
                }
                Some(v) if !v.is_null() && !type_matches(v, rule.sql_type) => {
                    issues.push(ValidationIssue {
                        path: rule.path.clone(),
                        message: format!("expected {:?}", rule.sql_type),
                    });
                }
                _ => {}
            }
        }

        if issues.is_empty() {
            Ok(value.clone())
        } else {
            Err(issues)
        }
    }

    fn schema_fields(&self) -> Vec<SchemaField> {
        self.fields
            .iter()
            .map(|rule| SchemaField {
                path: rule.path.clone(),
                sql_type: rule.sql_type,
                nullable: !rule.required,
                is_integer_refinement: rule.is_integer_refinement,
            })
            .collect()
    }
}

fn type_matches(value: &serde_json::Value, ty: ColumnType) -> bool {
    match ty {
        ColumnType::Text => value.is_string(),
        ColumnType::Integer => value.is_i64() || value.is_u64(),
        ColumnType::Real => value.is_number(),
        ColumnType::Boolean => value.is_boolean(),
        ColumnType::Blob | ColumnType::Vector => value.is_string() || value.is_array(),
    }
}

#[cfg(feature = "jsonschema")]
pub mod json_schema {
    use super::{ValidationIssue, Validator};
    use jsonschema::JSONSchema;

    /// Adapts a compiled `jsonschema::JSONSchema` document to the `Validator`
    /// trait. Does not support schema-field introspection for the migrator;
    /// collections relying on this adapter should declare constrained fields
    /// explicitly for diffing purposes.
    pub struct JsonSchemaValidator {
        compiled: JSONSchema,
    }

    impl JsonSchemaValidator {
        pub fn compile(schema: &serde_json::Value) -> Result<Self, String> {
            let compiled = JSONSchema::compile(schema).map_err(|e| e.to_string())?;
            Ok(Self { compiled })
        }
    }

    impl Validator for JsonSchemaValidator {
        fn parse(
            &self,
            value: &serde_json::Value,
        ) -> Result<serde_json::Value, Vec<ValidationIssue>> {
            let result = self.compiled.validate(value);
            match result {
                Ok(()) => Ok(value.clone()),
                Err(errors) => Err(errors
                    .map(|e| ValidationIssue {
                        path: e.instance_path.to_string(),
                        message: e.to_string(),
                    })
                    .collect()),
            }
        }
    }
}
