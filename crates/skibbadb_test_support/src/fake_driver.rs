//! An in-memory stand-in for a real [`Driver`] used to unit-test the
//! collection and transaction layers without touching SQLite.
//!
//! Outcomes are keyed by exact SQL text: register a canned result with
//! [`FakeDriver::with_query_result`]
//! or a failure with [`FakeDriver::with_query_error`], and anything
//! unregistered falls back to a default outcome (empty rows / zero rows
//! affected) unless [`FakeDriver::with_default_error`] was set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use skibbadb_core::{Driver, Error, Result, Row};

#[derive(Debug, Clone)]
pub enum FakeQueryOutcome {
    Rows(Vec<Row>),
    Affected(usize),
    Error(String),
}

impl FakeQueryOutcome {
    fn into_rows(self) -> Result<Vec<Row>> {
        match self {
            FakeQueryOutcome::Rows(rows) => Ok(rows),
            FakeQueryOutcome::Affected(_) => Ok(Vec::new()),
            FakeQueryOutcome::Error(message) => Err(Error::database(message)),
        }
    }

    fn into_affected(self) -> Result<usize> {
        match self {
            FakeQueryOutcome::Affected(n) => Ok(n),
            FakeQueryOutcome::Rows(rows) => Ok(rows.len()),
            FakeQueryOutcome::Error(message) => Err(Error::database(message)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriverStats {
    pub executed_sql: Vec<String>,
    pub transactions_started: usize,
    pub transactions_committed: usize,
    pub transactions_rolled_back: usize,
}

#[derive(Default)]
struct FakeDriverState {
    outcomes: RwLock<HashMap<String, FakeQueryOutcome>>,
    default_outcome: RwLock<Option<FakeQueryOutcome>>,
    executed_sql: Mutex<Vec<String>>,
    depth: Mutex<u32>,
    transactions_started: AtomicUsize,
    transactions_committed: AtomicUsize,
    transactions_rolled_back: AtomicUsize,
    close_calls: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<FakeDriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_result(self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.state
            .outcomes
            .write()
            .unwrap()
            .insert(sql.into(), FakeQueryOutcome::Rows(rows));
        self
    }

    pub fn with_affected(self, sql: impl Into<String>, count: usize) -> Self {
        self.state
            .outcomes
            .write()
            .unwrap()
            .insert(sql.into(), FakeQueryOutcome::Affected(count));
        self
    }

    pub fn with_query_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        self.state
            .outcomes
            .write()
            .unwrap()
            .insert(sql.into(), FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn with_default_error(self, message: impl Into<String>) -> Self {
        *self.state.default_outcome.write().unwrap() = Some(FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn stats(&self) -> FakeDriverStats {
        FakeDriverStats {
            executed_sql: self.state.executed_sql.lock().unwrap().clone(),
            transactions_started: self.state.transactions_started.load(Ordering::Relaxed),
            transactions_committed: self.state.transactions_committed.load(Ordering::Relaxed),
            transactions_rolled_back: self.state.transactions_rolled_back.load(Ordering::Relaxed),
        }
    }

    fn resolve(&self, sql: &str) -> FakeQueryOutcome {
        self.state.executed_sql.lock().unwrap().push(sql.to_string());
        self.state
            .outcomes
            .read()
            .unwrap()
            .get(sql)
            .cloned()
            .or_else(|| self.state.default_outcome.read().unwrap().clone())
            .unwrap_or(FakeQueryOutcome::Affected(0))
    }
}

impl Driver for FakeDriver {
    fn exec(&self, sql: &str, _params: &[skibbadb_core::Value]) -> Result<usize> {
        self.resolve(sql).into_affected()
    }

    fn query(&self, sql: &str, _params: &[skibbadb_core::Value]) -> Result<Vec<Row>> {
        self.resolve(sql).into_rows()
    }

    fn transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let mut depth = self.state.depth.lock().unwrap();
        if *depth == 0 {
            self.state.transactions_started.fetch_add(1, Ordering::Relaxed);
        }
        *depth += 1;
        drop(depth);

        let result = body();

        let mut depth = self.state.depth.lock().unwrap();
        *depth -= 1;
        if *depth == 0 {
            if result.is_ok() {
                self.state.transactions_committed.fetch_add(1, Ordering::Relaxed);
            } else {
                self.state.transactions_rolled_back.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn close(&self) -> Result<()> {
        self.state.close_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
