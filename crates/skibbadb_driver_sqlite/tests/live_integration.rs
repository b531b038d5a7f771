//! Integration tests against an on-disk SQLite file (as opposed to the
//! `:memory:` handle most unit tests in `src/driver.rs` use), exercising the
//! parts of the driver that only matter once data actually persists across
//! connections: pragma application on open, durability across a reopen, and
//! error classification against a real file-backed constraint violation.

use skibbadb_core::{Driver, Error, Value};
use skibbadb_driver_sqlite::{SqliteConfig, SqliteDriver};

fn temp_db_path() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.sqlite3");
    (dir, path)
}

#[test]
fn data_persists_across_a_reopen() {
    let (_dir, path) = temp_db_path();

    {
        let driver = SqliteDriver::open(&path, SqliteConfig::default()).unwrap();
        driver
            .exec("CREATE TABLE widgets (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
            .unwrap();
        driver
            .exec(
                "INSERT INTO widgets (_id, doc) VALUES (?, ?)",
                &[Value::Text("w1".into()), Value::Text("{\"name\":\"bolt\"}".into())],
            )
            .unwrap();
        driver.close().unwrap();
    }

    let driver = SqliteDriver::open(&path, SqliteConfig::default()).unwrap();
    let rows = driver.query("SELECT _id, doc FROM widgets", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("_id"), Some(&Value::Text("w1".into())));
}

#[test]
fn unique_violation_is_classified_against_a_file_backed_table() {
    let (_dir, path) = temp_db_path();
    let driver = SqliteDriver::open(&path, SqliteConfig::default()).unwrap();
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
fn read_only_handle_rejects_writes() {
    let (_dir, path) = temp_db_path();
    {
        let setup = SqliteDriver::open(&path, SqliteConfig::default()).unwrap();
        setup
            .exec("CREATE TABLE widgets (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
            .unwrap();
    }

    let read_only = SqliteDriver::open(&path, SqliteConfig { read_only: true, ..SqliteConfig::default() }).unwrap();
    let rows = read_only.query("SELECT _id FROM widgets", &[]).unwrap();
    assert!(rows.is_empty());

    let result = read_only.exec(
        "INSERT INTO widgets (_id, doc) VALUES (?, ?)",
        &[Value::Text("w1".into()), Value::Text("{}".into())],
    );
    assert!(result.is_err());
}

#[test]
fn transaction_rolls_back_on_disk_when_the_body_fails() {
    let (_dir, path) = temp_db_path();
    let driver = SqliteDriver::open(&path, SqliteConfig::default()).unwrap();
    driver
        .exec("CREATE TABLE counters (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)", &[])
        .unwrap();

    let result = driver.transaction(&mut || {
        driver.exec(
            "INSERT INTO counters (_id, doc) VALUES (?, ?)",
            &[Value::Text("c1".into()), Value::Text("{}".into())],
        )?;
        Err(Error::validation("forced rollback"))
    });
    assert!(result.is_err());

    let rows = driver.query("SELECT _id FROM counters", &[]).unwrap();
    assert!(rows.is_empty());
}
