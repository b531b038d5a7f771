//! Blocking SQLite [`Driver`] implementation: connection lifecycle, pragma
//! tuning, reentrant transactions, and SQLite error classification. `close`
//! drops the held connection; every `exec`/`query` after that is a no-op
//! rather than an error, keeping repeated shutdown calls harmless.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::Connection as RusqliteConnection;

use skibbadb_core::{Driver, Error, Result, Row, Value};

use crate::pragmas::{self, SqliteConfig};
use crate::sqlite_error::classify;

struct ConnState {
    conn: Option<RusqliteConnection>,
    depth: u32,
}

/// A blocking, single-connection SQLite driver.
///
/// Transactions are reentrant: nested `transaction` calls from inside a
/// running transaction's body reuse the same `BEGIN`/`COMMIT` pair, tracked
/// via an internal depth counter rather than SQLite's own `SAVEPOINT`s, so a
/// failure anywhere in the nest rolls the whole thing back.
pub struct SqliteDriver {
    state: Mutex<ConnState>,
    query_count: AtomicU64,
}

impl SqliteDriver {
    pub fn open(path: &Path, config: SqliteConfig) -> Result<Self> {
        let conn = if config.read_only {
            RusqliteConnection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
        } else {
            RusqliteConnection::open(path)
        }
        .map_err(|e| Error::database(format!("failed to open {}: {e}", path.display())))?;

        pragmas::apply_pragmas(&conn, &config)
            .map_err(|e| Error::database(format!("failed to apply pragmas: {e}")))?;

        Ok(SqliteDriver {
            state: Mutex::new(ConnState { conn: Some(conn), depth: 0 }),
            query_count: AtomicU64::new(0),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = RusqliteConnection::open_in_memory()
            .map_err(|e| Error::database(format!("failed to open in-memory database: {e}")))?;
        pragmas::apply_pragmas(&conn, &SqliteConfig::default())
            .map_err(|e| Error::database(format!("failed to apply pragmas: {e}")))?;
        Ok(SqliteDriver {
            state: Mutex::new(ConnState { conn: Some(conn), depth: 0 }),
            query_count: AtomicU64::new(0),
        })
    }

    fn record_query(&self, conn: &RusqliteConnection) {
        let count = self.query_count.fetch_add(1, Ordering::Relaxed) + 1;
        if let Err(e) = pragmas::retune_cache_if_needed(conn, count) {
            log::warn!("failed to retune cache_size at query {count}: {e}");
        }
    }
}

impl Driver for SqliteDriver {
    fn exec(&self, sql: &str, params: &[Value]) -> Result<usize> {
        let state = self.state.lock().expect("sqlite driver mutex poisoned");
        let Some(conn) = state.conn.as_ref() else {
            return Ok(0);
        };
        let bound: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
        let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let result = conn.execute(sql, refs.as_slice()).map_err(classify);
        self.record_query(conn);
        result
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let state = self.state.lock().expect("sqlite driver mutex poisoned");
        let Some(conn) = state.conn.as_ref() else {
            return Ok(Vec::new());
        };
        let mut stmt = conn.prepare(sql).map_err(classify)?;
        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let bound: Vec<SqliteValue> = params.iter().map(to_sqlite_value).collect();
        let refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|v| v as &dyn rusqlite::ToSql).collect();

        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                let mut columns = Vec::with_capacity(column_names.len());
                for (idx, name) in column_names.iter().enumerate() {
                    columns.push((name.clone(), from_sqlite_value(row.get_ref(idx)?)));
                }
                Ok(Row::new(columns))
            })
            .map_err(classify)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(classify)?);
        }
        self.record_query(conn);
        Ok(out)
    }

    fn transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        {
            let mut state = self.state.lock().expect("sqlite driver mutex poisoned");
            if let Some(conn) = state.conn.as_ref() {
                if state.depth == 0 {
                    conn.execute_batch("BEGIN").map_err(classify)?;
                }
                state.depth += 1;
            }
        }

        let result = body();

        let mut state = self.state.lock().expect("sqlite driver mutex poisoned");
        if let Some(conn) = state.conn.as_ref() {
            state.depth -= 1;
            if state.depth == 0 {
                match &result {
                    Ok(()) => conn.execute_batch("COMMIT").map_err(classify)?,
                    Err(_) => {
                        if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                            log::error!("rollback after failed transaction also failed: {rollback_err}");
                        }
                    }
                }
            }
        }
        result
    }

    /// Idempotent: a driver that is already closed returns `Ok(())` rather
    /// than erroring, and every subsequent `exec`/`query` call becomes a
    /// no-op (zero rows affected / empty results) instead of failing, so
    /// shutdown sequences that call `close` more than once stay safe.
    fn close(&self) -> Result<()> {
        let mut state = self.state.lock().expect("sqlite driver mutex poisoned");
        state.conn.take();
        Ok(())
    }
}

fn to_sqlite_value(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(if *b { 1 } else { 0 }),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Blob(b) => SqliteValue::Blob(b.clone()),
        Value::DateTime(dt) => SqliteValue::Text(dt.to_rfc3339()),
    }
}

fn from_sqlite_value(value_ref: ValueRef<'_>) -> Value {
    match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> SqliteDriver {
        SqliteDriver::open_in_memory().unwrap()
    }

    #[test]
    fn exec_and_query_roundtrip() {
        let driver = driver();
        driver
            .exec("CREATE TABLE widgets (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
            .unwrap();
        driver
            .exec(
                "INSERT INTO widgets (_id, doc) VALUES (?, ?)",
                &[Value::Text("w1".into()), Value::Text("{\"name\":\"bolt\"}".into())],
            )
            .unwrap();

        let rows = driver.query("SELECT _id, doc FROM widgets", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("_id"), Some(&Value::Text("w1".into())));
    }

    #[test]
    fn unique_violation_is_classified() {
        let driver = driver();
        driver
            .exec(
                "CREATE TABLE widgets (_id TEXT PRIMARY KEY, sku TEXT NOT NULL UNIQUE, doc TEXT NOT NULL)",
                &[],
            )
            .unwrap();
        driver
            .exec(
                "INSERT INTO widgets (_id, sku, doc) VALUES (?, ?, ?)",
                &[Value::Text("w1".into()), Value::Text("A1".into()), Value::Text("{}".into())],
            )
            .unwrap();
        let err = driver
            .exec(
                "INSERT INTO widgets (_id, sku, doc) VALUES (?, ?, ?)",
                &[Value::Text("w2".into()), Value::Text("A1".into()), Value::Text("{}".into())],
            )
            .unwrap_err();
        match err {
            Error::UniqueConstraint { fields } => assert_eq!(fields, vec!["sku".to_string()]),
            other => panic!("expected UniqueConstraint, got {other:?}"),
        }
    }

    #[test]
    fn nested_transactions_share_one_begin_commit() {
        let driver = driver();
        driver
            .exec("CREATE TABLE counters (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
            .unwrap();

        driver
            .transaction(&mut || {
                driver.exec(
                    "INSERT INTO counters (_id, doc) VALUES (?, ?)",
                    &[Value::Text("a".into()), Value::Text("{}".into())],
                )?;
                driver.transaction(&mut || {
                    driver.exec(
                        "INSERT INTO counters (_id, doc) VALUES (?, ?)",
                        &[Value::Text("b".into()), Value::Text("{}".into())],
                    )?;
                    Ok(())
                })
            })
            .unwrap();

        let rows = driver.query("SELECT _id FROM counters", &[]).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn closed_driver_swallows_subsequent_exec_and_query_as_no_ops() {
        let driver = driver();
        driver
            .exec("CREATE TABLE widgets (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
            .unwrap();
        driver.close().unwrap();

        let affected = driver
            .exec(
                "INSERT INTO widgets (_id, doc) VALUES (?, ?)",
                &[Value::Text("w1".into()), Value::Text("{}".into())],
            )
            .unwrap();
        assert_eq!(affected, 0);

        let rows = driver.query("SELECT _id FROM widgets", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let driver = driver();
        driver.close().unwrap();
        driver.close().unwrap();
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let driver = driver();
        driver
            .exec("CREATE TABLE counters (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
            .unwrap();

        let result = driver.transaction(&mut || {
            driver.exec(
                "INSERT INTO counters (_id, doc) VALUES (?, ?)",
                &[Value::Text("a".into()), Value::Text("{}".into())],
            )?;
            Err(Error::validation("forced rollback"))
        });
        assert!(result.is_err());

        let rows = driver.query("SELECT _id FROM counters", &[]).unwrap();
        assert!(rows.is_empty());
    }
}
