//! Cooperative facade: thin `spawn_blocking` wrappers over [`Database`] and
//! [`Collection`] so async callers share the exact same CRUD, validation,
//! and compiler logic as blocking ones instead of a parallel reimplementation.

use std::sync::Arc;

use skibbadb_core::{CollectionOptions, Error, QueryBuilder, Result, Row, Validator, Value};

use crate::collection::Collection;
use crate::config::Config;
use crate::database::Database;
use crate::plugin::Plugin;

fn join_panic(e: tokio::task::JoinError) -> Error {
    Error::database(format!("blocking database task panicked: {e}"))
}

async fn spawn<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(join_panic)?
}

/// Async handle over a [`Database`]. Every method hops onto a blocking
/// worker thread; the underlying SQLite connection still only does one
/// thing at a time, so this buys isolation from the runtime, not real
/// concurrency within a single database.
#[derive(Clone)]
pub struct AsyncDatabase {
    inner: Arc<Database>,
}

impl AsyncDatabase {
    pub async fn open(config: Config) -> Result<Self> {
        let inner = spawn(move || Database::open(config).map(Arc::new)).await?;
        Ok(AsyncDatabase { inner })
    }

    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        self.inner.register_plugin(plugin)
    }

    /// See [`Database::wait_for_initialization`]. `open` already awaited the
    /// blocking init on a worker thread, so this resolves immediately.
    pub async fn wait_for_initialization(&self) -> Result<()> {
        self.inner.wait_for_initialization()
    }

    pub async fn collection(
        &self,
        name: &str,
        validator: Arc<dyn Validator>,
        opts: CollectionOptions,
    ) -> Result<AsyncCollection> {
        let inner = self.inner.clone();
        let name = name.to_string();
        let collection = spawn(move || inner.collection(&name, validator, opts)).await?;
        Ok(AsyncCollection { inner: collection })
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.inner.has_collection(name)
    }

    /// Runs `body` on a blocking worker thread inside a single transaction.
    /// `body` itself stays synchronous: reuse `Database::transaction`
    /// directly (not this wrapper) if the transaction body needs to await.
    pub async fn transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        spawn(move || inner.transaction(body)).await
    }

    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>> {
        let inner = self.inner.clone();
        let sql = sql.to_string();
        spawn(move || inner.query(&sql, &params)).await
    }

    pub async fn exec(&self, sql: &str, params: Vec<Value>) -> Result<usize> {
        let inner = self.inner.clone();
        let sql = sql.to_string();
        spawn(move || inner.exec(&sql, &params)).await
    }

    pub async fn close(&self) -> Result<()> {
        let inner = self.inner.clone();
        spawn(move || inner.close()).await
    }
}

/// Async handle over a [`Collection`], obtained from [`AsyncDatabase::collection`].
#[derive(Clone)]
pub struct AsyncCollection {
    inner: Arc<Collection>,
}

impl AsyncCollection {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn insert(&self, doc: serde_json::Value) -> Result<serde_json::Value> {
        let inner = self.inner.clone();
        spawn(move || inner.insert(doc)).await
    }

    pub async fn insert_bulk(&self, docs: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>> {
        let inner = self.inner.clone();
        spawn(move || inner.insert_bulk(docs)).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let inner = self.inner.clone();
        let id = id.to_string();
        spawn(move || inner.find_by_id(&id)).await
    }

    pub async fn put(&self, id: &str, doc: serde_json::Value) -> Result<serde_json::Value> {
        let inner = self.inner.clone();
        let id = id.to_string();
        spawn(move || inner.put(&id, doc)).await
    }

    pub async fn put_bulk(&self, docs: Vec<(String, serde_json::Value)>) -> Result<Vec<serde_json::Value>> {
        let inner = self.inner.clone();
        spawn(move || inner.put_bulk(docs)).await
    }

    pub async fn upsert(&self, doc: serde_json::Value) -> Result<serde_json::Value> {
        let inner = self.inner.clone();
        spawn(move || inner.upsert(doc)).await
    }

    pub async fn upsert_bulk(&self, docs: Vec<serde_json::Value>) -> Result<Vec<serde_json::Value>> {
        let inner = self.inner.clone();
        spawn(move || inner.upsert_bulk(docs)).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let inner = self.inner.clone();
        let id = id.to_string();
        spawn(move || inner.delete(&id)).await
    }

    pub async fn delete_bulk(&self, ids: Vec<String>) -> Result<usize> {
        let inner = self.inner.clone();
        spawn(move || inner.delete_bulk(&ids)).await
    }

    pub async fn count(&self, qb: QueryBuilder) -> Result<i64> {
        let inner = self.inner.clone();
        spawn(move || inner.count(&qb)).await
    }

    pub async fn to_array(&self, qb: QueryBuilder) -> Result<Vec<serde_json::Value>> {
        let inner = self.inner.clone();
        spawn(move || inner.to_array(&qb)).await
    }

    pub async fn first(&self, qb: QueryBuilder) -> Result<Option<serde_json::Value>> {
        let inner = self.inner.clone();
        spawn(move || inner.first(&qb)).await
    }
}
