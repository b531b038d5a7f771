//! `Database`: owns the driver, the process-local
//! registry, the plugin manager, and every collection lazily initialized
//! through it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use skibbadb_core::{CollectionDescriptor, CollectionOptions, Driver, Registry, Result, Row, SqlDialect, SqliteDialect, Validator, Value};
use skibbadb_driver_sqlite::{SqliteConfig, SqliteDriver};

use crate::collection::Collection;
use crate::config::Config;
use crate::plugin::{ErrorPolicy, Plugin, PluginManager};

pub struct Database {
    driver: Arc<dyn Driver>,
    registry: Arc<Registry>,
    plugins: Arc<PluginManager>,
    dialect: Arc<dyn SqlDialect>,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

impl Database {
    /// Opens (or creates) the backing SQLite database per `config` and
    /// applies its pragma overrides. Always builds the blocking `SqliteDriver`;
    /// async callers get there through `AsyncDatabase::open`, which wraps this
    /// same path in `spawn_blocking`.
    pub fn open(config: Config) -> Result<Self> {
        let sqlite_config: SqliteConfig = config.sqlite.clone().into_driver_config();
        let driver: Arc<dyn Driver> = if config.memory {
            Arc::new(SqliteDriver::open_in_memory()?)
        } else {
            let path = config
                .path
                .clone()
                .ok_or_else(|| skibbadb_core::Error::invalid_argument("non-memory config requires a path"))?;
            Arc::new(SqliteDriver::open(&path, sqlite_config)?)
        };

        let plugins = Arc::new(PluginManager::new(ErrorPolicy::Strict));
        plugins.database_init()?;

        Ok(Database {
            driver,
            registry: Arc::new(Registry::new()),
            plugins,
            dialect: Arc::new(SqliteDialect),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Synchronization point matching the moment the database becomes safe
    /// to use. `open` only returns once the driver is connected and
    /// `onDatabaseInit` hooks have run, so there is no deferred
    /// initialization left to wait for; this is a no-op provided so callers
    /// migrating from a lazily-initializing driver have a stable place to
    /// put the wait.
    pub fn wait_for_initialization(&self) -> Result<()> {
        Ok(())
    }

    /// Registers a plugin. Safe to call at any point, including after
    /// collections already exist: `PluginManager` shares its plugin list by
    /// reference, so every `Collection` handed out earlier observes the new
    /// plugin too.
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.plugins.register(plugin);
        Ok(())
    }

    /// Returns the collection, installing its table/indexes and running any
    /// pending migrations the first time it is requested. Subsequent calls
    /// for the same name return the cached handle without touching the
    /// database again.
    pub fn collection(
        &self,
        name: &str,
        validator: Arc<dyn Validator>,
        opts: CollectionOptions,
    ) -> Result<Arc<Collection>> {
        if let Some(existing) = self.collections.read().expect("collections lock poisoned").get(name) {
            return Ok(existing.clone());
        }

        let descriptor = self.registry.register(CollectionDescriptor::new(name, validator, opts))?;

        skibbadb_migrator::migrate_collection(self.driver.as_ref(), &descriptor, self.dialect.as_ref())?;

        self.plugins.collection_create(name)?;

        let collection = Arc::new(Collection::new(
            descriptor,
            self.driver.clone(),
            self.registry.clone(),
            self.plugins.clone(),
            self.dialect.clone(),
        ));

        self.collections
            .write()
            .expect("collections lock poisoned")
            .insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().expect("collections lock poisoned").contains_key(name)
    }

    /// Drops a collection's backing table and forgets its descriptor and
    /// cached handle. A later `collection()` call with the same name starts
    /// over as if it had never existed.
    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.plugins.collection_drop(name)?;
        let table = self.dialect.quote_identifier(name);
        self.driver.exec(&format!("DROP TABLE IF EXISTS {table}"), &[])?;
        self.registry.remove(name);
        self.collections.write().expect("collections lock poisoned").remove(name);
        Ok(())
    }

    /// Runs `body` inside a single transaction. Nested `Database::transaction`
    /// or `Collection` calls made from within `body` reuse this same
    /// transaction (see `Driver::transaction`).
    pub fn transaction<T>(&self, body: impl FnOnce() -> Result<T>) -> Result<T> {
        self.plugins.before_transaction()?;

        let mut slot: Option<T> = None;
        let mut body = Some(body);
        let result = self.driver.transaction(&mut || {
            let body = body.take().expect("transaction body invoked more than once");
            slot = Some(body()?);
            Ok(())
        });

        self.plugins.after_transaction()?;
        result?;
        Ok(slot.expect("successful transaction must have produced a value"))
    }

    /// Raw SQL escape hatch, bypassing the query builder entirely.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.driver.query(sql, params)
    }

    pub fn exec(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.driver.exec(sql, params)
    }

    pub fn close(&self) -> Result<()> {
        self.plugins.database_close()?;
        self.driver.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skibbadb_core::validator::PermissiveValidator;
    use skibbadb_core::{ColumnType, ConstrainedFieldDef};

    fn open_memory() -> Database {
        Database::open(Config::new()).unwrap()
    }

    #[test]
    fn collection_handle_is_cached_across_calls() {
        let db = open_memory();
        let opts = CollectionOptions::new().field(ConstrainedFieldDef::new("email", ColumnType::Text).unique());
        let first = db.collection("users", Arc::new(PermissiveValidator), opts).unwrap();
        let second = db.collection("users", Arc::new(PermissiveValidator), CollectionOptions::new()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn raw_query_and_exec_bypass_the_builder() {
        let db = open_memory();
        db.exec("CREATE TABLE scratch (n INTEGER)", &[]).unwrap();
        db.exec("INSERT INTO scratch (n) VALUES (?)", &[Value::Int(7)]).unwrap();
        let rows = db.query("SELECT n FROM scratch", &[]).unwrap();
        assert_eq!(rows[0].get("n"), Some(&Value::Int(7)));
    }

    #[test]
    fn transaction_returns_the_body_value_on_success() {
        let db = open_memory();
        let value = db.transaction(|| Ok(42)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn transaction_propagates_body_error_and_rolls_back() {
        let db = open_memory();
        db.exec("CREATE TABLE scratch (n INTEGER)", &[]).unwrap();
        let result: Result<()> = db.transaction(|| {
            db.exec("INSERT INTO scratch (n) VALUES (1)", &[])?;
            Err(skibbadb_core::Error::validation("forced"))
        });
        assert!(result.is_err());
        let rows = db.query("SELECT n FROM scratch", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn collection_is_usable_after_lazy_initialization() {
        let db = open_memory();
        let opts = CollectionOptions::new().field(ConstrainedFieldDef::new("email", ColumnType::Text));
        let users = db.collection("users", Arc::new(PermissiveValidator), opts).unwrap();
        let inserted = users.insert(serde_json::json!({"email": "a@example.com"})).unwrap();
        let found = users.find_by_id(inserted["id"].as_str().unwrap()).unwrap().unwrap();
        assert_eq!(found["email"], serde_json::json!("a@example.com"));
    }

    #[test]
    fn wait_for_initialization_succeeds_once_open_has_returned() {
        let db = open_memory();
        db.wait_for_initialization().unwrap();
    }

    #[test]
    fn drop_collection_forgets_the_table_and_handle() {
        let db = open_memory();
        db.collection("users", Arc::new(PermissiveValidator), CollectionOptions::new()).unwrap();
        assert!(db.has_collection("users"));

        db.drop_collection("users").unwrap();
        assert!(!db.has_collection("users"));

        let err = db.query("SELECT * FROM \"users\"", &[]).unwrap_err();
        assert!(matches!(err, skibbadb_core::Error::Database(_)));

        let recreated = db.collection("users", Arc::new(PermissiveValidator), CollectionOptions::new()).unwrap();
        recreated.insert(serde_json::json!({"name": "fresh"})).unwrap();
    }
}
