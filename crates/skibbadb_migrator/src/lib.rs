//! Versioned schema migrations layered over the constraint/index installer:
//! a meta table of stored versions, non-breaking schema diffing, and
//! transactional plan execution with dry-run support.

pub mod diff;
pub mod error;
pub mod meta;
pub mod plan;

pub use diff::{generate_schema_diff, introspect_columns, ExistingColumn, SchemaDiff};
pub use error::MigratorError;
pub use plan::migrate_collection;
