//! Collection descriptors: `CollectionDescriptor` and `ConstrainedFieldDef`
//! plus the options surface callers use to declare one.

use crate::validator::Validator;
use crate::value::ColumnType;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl ForeignKeyAction {
    pub fn sql_name(self) -> &'static str {
        match self {
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::NoAction => "NO ACTION",
        }
    }
}

/// `table.field` reference for a constrained field's foreign key.
#[derive(Debug, Clone)]
pub struct ForeignKeyRef {
    pub table: String,
    pub field: String,
}

impl ForeignKeyRef {
    /// Parse the `"table.field"` shorthand for a foreign key reference.
    pub fn parse(spec: &str) -> Option<Self> {
        let (table, field) = spec.split_once('.')?;
        Some(Self {
            table: table.to_string(),
            field: field.to_string(),
        })
    }
}

/// A document path promoted to a dedicated SQL column.
#[derive(Debug, Clone)]
pub struct ConstrainedFieldDef {
    /// Dotted JSON path within the document, e.g. `"address.city"`.
    pub path: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub foreign_key: Option<ForeignKeyRef>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
    pub check_constraint: Option<String>,
    pub vector_dimensions: Option<u32>,
    pub vector_type: Option<String>,
    /// Whether an index should be installed for this field (column index for
    /// shallow paths, expression index on `json_extract` for dotted ones).
    pub indexed: bool,
}

impl ConstrainedFieldDef {
    pub fn new(path: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            path: path.into(),
            ty,
            nullable: true,
            unique: false,
            foreign_key: None,
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
            check_constraint: None,
            vector_dimensions: None,
            vector_type: None,
            indexed: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn references(mut self, table_dot_field: &str, on_delete: ForeignKeyAction) -> Self {
        self.foreign_key = ForeignKeyRef::parse(table_dot_field);
        self.on_delete = on_delete;
        self
    }

    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check_constraint = Some(expr.into());
        self
    }

    /// The column name: for a dotted path, column identifiers cannot contain
    /// `.`, so `address.city` becomes `address_city`.
    pub fn column_name(&self) -> String {
        self.path.replace('.', "_")
    }

    pub fn is_dotted(&self) -> bool {
        self.path.contains('.')
    }
}

/// A named explicit index, possibly partial (`WHERE`) and/or unique.
#[derive(Debug, Clone)]
pub struct IndexDef {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
    pub where_clause: Option<String>,
}

/// Legacy pre-`constrainedFields` declaration, lowered into one on
/// registration.
#[derive(Debug, Clone)]
pub struct LegacyConstraint {
    pub path: String,
    pub ty: ColumnType,
    pub unique: bool,
    pub not_null: bool,
}

pub type SeedFn = Arc<dyn Fn() -> crate::error::Result<()> + Send + Sync>;

/// A conditional upgrade step: skipped entirely when `condition` is false.
pub struct UpgradeStep {
    pub condition: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
    pub migrate: Arc<dyn Fn() -> crate::error::Result<()> + Send + Sync>,
}

impl UpgradeStep {
    pub fn always(migrate: impl Fn() -> crate::error::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            condition: None,
            migrate: Arc::new(migrate),
        }
    }

    pub fn should_run(&self) -> bool {
        self.condition.as_ref().is_none_or(|cond| cond())
    }
}

impl std::fmt::Debug for UpgradeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeStep")
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}

/// Options passed to `Database::collection(name, schema, opts)`.
#[derive(Debug, Default)]
pub struct CollectionOptions {
    pub primary_key_field: Option<String>,
    pub version: Option<u32>,
    pub constrained_fields: Vec<ConstrainedFieldDef>,
    pub indexes: Vec<IndexDef>,
    pub composite_unique: Vec<Vec<String>>,
    pub legacy_constraints: HashMap<String, LegacyConstraint>,
    pub upgrades: HashMap<u32, UpgradeStep>,
    pub seed: Option<SeedFn>,
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key_field = Some(field.into());
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn field(mut self, field: ConstrainedFieldDef) -> Self {
        self.constrained_fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn composite_unique(mut self, fields: &[&str]) -> Self {
        self.composite_unique
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn upgrade(mut self, to_version: u32, step: UpgradeStep) -> Self {
        self.upgrades.insert(to_version, step);
        self
    }

    pub fn seed(mut self, seed: impl Fn() -> crate::error::Result<()> + Send + Sync + 'static) -> Self {
        self.seed = Some(Arc::new(seed));
        self
    }
}

/// The fully-resolved, immutable-after-registration collection metadata.
pub struct CollectionDescriptor {
    pub name: String,
    pub validator: Arc<dyn Validator>,
    pub primary_key_field: String,
    pub version: u32,
    pub constrained_fields: Vec<ConstrainedFieldDef>,
    pub indexes: Vec<IndexDef>,
    pub composite_unique: Vec<Vec<String>>,
    pub upgrades: HashMap<u32, UpgradeStep>,
    pub seed: Option<SeedFn>,
}

impl std::fmt::Debug for CollectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionDescriptor")
            .field("name", &self.name)
            .field("primary_key_field", &self.primary_key_field)
            .field("version", &self.version)
            .field("constrained_fields", &self.constrained_fields.len())
            .finish()
    }
}

impl CollectionDescriptor {
    pub fn new(name: impl Into<String>, validator: Arc<dyn Validator>, opts: CollectionOptions) -> Self {
        let mut constrained_fields = opts.constrained_fields;
        for (path, legacy) in opts.legacy_constraints {
            constrained_fields.push(lower_legacy_constraint(path, legacy));
        }

        Self {
            name: name.into(),
            validator,
            primary_key_field: opts.primary_key_field.unwrap_or_else(|| "id".to_string()),
            version: opts.version.unwrap_or(1),
            constrained_fields,
            indexes: opts.indexes,
            composite_unique: opts.composite_unique,
            upgrades: opts.upgrades,
            seed: opts.seed,
        }
    }

    pub fn find_field(&self, path: &str) -> Option<&ConstrainedFieldDef> {
        self.constrained_fields.iter().find(|f| f.path == path)
    }
}

fn lower_legacy_constraint(path: String, legacy: LegacyConstraint) -> ConstrainedFieldDef {
    let mut field = ConstrainedFieldDef::new(path, legacy.ty);
    field.unique = legacy.unique;
    field.nullable = !legacy.not_null;
    field
}
