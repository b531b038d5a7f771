//! Embedded document database over SQLite: collections are backed by SQL
//! tables storing documents as JSON alongside constrained columns promoted
//! out of the document for indexing, uniqueness, and foreign keys.
//!
//! This crate is the facade applications depend on directly; it re-exports
//! the pieces of [`skibbadb_core`] callers need (the value model, the query
//! builder, the document codec, the error type) so they never need a direct
//! dependency on the core crate.

pub mod collection;
pub mod config;
pub mod cooperative;
pub mod database;
pub mod plugin;

pub use collection::Collection;
pub use config::{Config, SqliteOptions};
pub use cooperative::{AsyncCollection, AsyncDatabase};
pub use database::Database;
pub use plugin::{ErrorPolicy, Plugin, PluginManager};

pub use skibbadb_core::{
    Cmp, CollectionDescriptor, CollectionOptions, ColumnType, Compiler, CompiledQuery,
    ConstrainedFieldDef, Direction, Document, Error, FieldRule, FieldValidator, ForeignKeyAction,
    IndexDef, Op, PermissiveValidator, QueryBuilder, Result, Row, SchemaField, UpgradeStep,
    ValidationIssue, Validator, Value,
};
