//! End-to-end tests against a real `Database::open(Config::new())` (in-memory
//! SQLite), exercising the behaviors that a `FakeDriver`-backed unit test
//! can't: live constraint enforcement, query compilation against actual
//! rows, and invariants that only hold once SQLite itself is in the loop.

use std::sync::Arc;

use skibbadb::{
    Collection, CollectionOptions, ColumnType, Config, ConstrainedFieldDef, Database, Error,
    ForeignKeyAction, PermissiveValidator, QueryBuilder, Value,
};

fn open() -> Database {
    Database::open(Config::new()).unwrap()
}

fn users(db: &Database) -> Arc<Collection> {
    let opts = CollectionOptions::new().field(ConstrainedFieldDef::new("email", ColumnType::Text).unique());
    db.collection("users", Arc::new(PermissiveValidator), opts).unwrap()
}

/// Scenario 1: a declared-unique constrained field rejects a second insert
/// with the same value once it actually reaches SQLite's own UNIQUE index.
#[test]
fn unique_constraint_is_enforced_end_to_end() {
    let db = open();
    let users = users(&db);

    users.insert(serde_json::json!({"email": "a@example.com"})).unwrap();
    let err = users.insert(serde_json::json!({"email": "a@example.com"})).unwrap_err();
    match err {
        Error::UniqueConstraint { fields } => assert_eq!(fields, vec!["email".to_string()]),
        other => panic!("expected UniqueConstraint, got {other:?}"),
    }
}

/// I1: the materialized constrained column always matches `json_extract` of
/// the stored document, even after an update changes the field.
#[test]
fn constrained_column_stays_in_sync_with_the_document_after_an_update() {
    let db = open();
    let users = users(&db);

    let inserted = users.insert(serde_json::json!({"email": "a@example.com"})).unwrap();
    let id = inserted["id"].as_str().unwrap().to_string();
    users.put(&id, serde_json::json!({"email": "b@example.com"})).unwrap();

    let rows = db
        .query(
            "SELECT email, json_extract(doc, '$.email') AS doc_email FROM \"users\" WHERE _id = ?",
            &[Value::Text(id)],
        )
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("email"), rows[0].get("doc_email"));
    assert_eq!(rows[0].get("email"), Some(&Value::Text("b@example.com".to_string())));
}

/// Scenario 4: an OR-group over two constrained fields compiles to a real
/// `WHERE (a = ? OR b = ?)` and returns the right row count against a live
/// table with several non-matching rows mixed in.
#[test]
fn or_group_row_count_matches_against_a_live_table() {
    let db = open();
    let opts = CollectionOptions::new()
        .field(ConstrainedFieldDef::new("status", ColumnType::Text))
        .field(ConstrainedFieldDef::new("priority", ColumnType::Integer));
    let tickets = db.collection("tickets", Arc::new(PermissiveValidator), opts).unwrap();

    tickets.insert(serde_json::json!({"status": "open", "priority": 1})).unwrap();
    tickets.insert(serde_json::json!({"status": "closed", "priority": 9})).unwrap();
    tickets.insert(serde_json::json!({"status": "closed", "priority": 1})).unwrap();
    tickets.insert(serde_json::json!({"status": "pending", "priority": 5})).unwrap();

    let qb = QueryBuilder::new("tickets")
        .eq("status", "open")
        .or(|b| b.eq("priority", 1i64));

    assert_eq!(tickets.count(&qb).unwrap(), 2);
}

/// Scenario 5: `array_contains` against a JSON array field filters correctly
/// against rows actually stored in SQLite.
#[test]
fn json_array_filter_matches_against_a_live_table() {
    let db = open();
    let opts = CollectionOptions::new();
    let posts = db.collection("posts", Arc::new(PermissiveValidator), opts).unwrap();

    posts.insert(serde_json::json!({"title": "a", "tags": ["rust", "db"]})).unwrap();
    posts.insert(serde_json::json!({"title": "b", "tags": ["rust", "web"]})).unwrap();
    posts.insert(serde_json::json!({"title": "c", "tags": ["go"]})).unwrap();

    let qb = QueryBuilder::new("posts").array_contains("tags", "db");
    let matches = posts.to_array(&qb).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["title"], serde_json::json!("a"));
}

/// Scenario 6 / I4: deleting a parent row removes every child row that
/// references it through an `ON DELETE CASCADE` foreign key.
#[test]
fn cascade_delete_removes_child_rows() {
    let db = open();
    let authors = db
        .collection("authors", Arc::new(PermissiveValidator), CollectionOptions::new())
        .unwrap();
    let books_opts = CollectionOptions::new().field(
        ConstrainedFieldDef::new("author_id", ColumnType::Text).references("authors._id", ForeignKeyAction::Cascade),
    );
    let books = db.collection("books", Arc::new(PermissiveValidator), books_opts).unwrap();

    let author = authors.insert(serde_json::json!({"name": "Ada"})).unwrap();
    let author_id = author["id"].as_str().unwrap().to_string();
    books
        .insert(serde_json::json!({"title": "Notes", "author_id": author_id}))
        .unwrap();
    books
        .insert(serde_json::json!({"title": "More Notes", "author_id": author_id}))
        .unwrap();

    assert_eq!(books.count(&QueryBuilder::new("books")).unwrap(), 2);

    authors.delete(&author_id).unwrap();

    assert_eq!(books.count(&QueryBuilder::new("books")).unwrap(), 0);
}

/// I5: within a single `Database::transaction` body, a write is visible to a
/// subsequent read in that same body, before the transaction commits.
#[test]
fn write_is_visible_to_a_later_read_within_the_same_transaction() {
    let db = open();
    let users = users(&db);

    let seen_count = db
        .transaction(|| {
            users.insert(serde_json::json!({"email": "a@example.com"}))?;
            users.count(&QueryBuilder::new("users"))
        })
        .unwrap();

    assert_eq!(seen_count, 1);
}

/// I2: a failed migration (a breaking type change against an existing
/// table) leaves the stored version untouched rather than partially applied.
#[test]
fn failed_migration_leaves_stored_version_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles.sqlite3");

    {
        let db = Database::open(Config::new().path(path.clone())).unwrap();
        let opts = CollectionOptions::new().version(1).field(ConstrainedFieldDef::new("age", ColumnType::Integer));
        db.collection("profiles", Arc::new(PermissiveValidator), opts).unwrap();
        db.close().unwrap();
    }

    let db = Database::open(Config::new().path(path.clone())).unwrap();
    let rows_before = db
        .query("SELECT version FROM _skibbadb_migrations WHERE collection = 'profiles'", &[])
        .unwrap();
    let version_before = rows_before[0].get("version").cloned();

    let breaking_opts = CollectionOptions::new().version(2).field(ConstrainedFieldDef::new("age", ColumnType::Text));
    let err = db.collection("profiles", Arc::new(PermissiveValidator), breaking_opts).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let rows_after = db
        .query("SELECT version FROM _skibbadb_migrations WHERE collection = 'profiles'", &[])
        .unwrap();
    assert_eq!(rows_after[0].get("version"), version_before.as_ref());
}
