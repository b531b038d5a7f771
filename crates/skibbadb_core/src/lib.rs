//! Core engine pieces shared by the blocking driver and the facades built on
//! top of it: the value model, document codec, collection descriptors,
//! registry, validator abstraction, constraint/index DDL generation, and the
//! query AST/compiler.

pub mod codec;
pub mod ddl;
pub mod driver;
pub mod error;
pub mod query;
pub mod registry;
pub mod schema;
pub mod sql_dialect;
pub mod validator;
pub mod value;

pub use codec::{decode, encode, merge_constrained_columns, Document};
pub use driver::{Driver, Row};
pub use error::{Error, Result};
pub use query::{Cmp, Compiler, CompiledQuery, Direction, Op, QueryBuilder};
pub use registry::Registry;
pub use schema::{
    CollectionDescriptor, CollectionOptions, ConstrainedFieldDef, ForeignKeyAction, ForeignKeyRef,
    IndexDef, LegacyConstraint, SeedFn, UpgradeStep,
};
pub use sql_dialect::{PlaceholderStyle, SqlDialect, SqliteDialect};
pub use validator::{FieldRule, FieldValidator, PermissiveValidator, SchemaField, ValidationIssue, Validator};
pub use value::{ColumnType, Value};
