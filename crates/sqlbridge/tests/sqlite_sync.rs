//! Synchronous and error-output forms against a real SQLite database.
#![cfg(feature = "sqlite")]

mod common;

use sqlbridge::prelude::*;
use sqlbridge::{OpenFlags, SqliteStatement};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BAD_PATH: &str = "/foo/bar/bad-path/not-real.db";

fn memory_connection(ctx: &IoContext) -> Connection<Sqlite> {
    common::init_tracing();
    let conn = Connection::<Sqlite>::new(ctx);
    conn.connect(":memory:").expect("open sqlite memory db");
    conn
}

#[test]
fn sqlite_insert_then_select_into_tuples() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);

    conn.execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .unwrap();
    conn.execute("INSERT INTO people (id, name) VALUES (1, 'Alice')")
        .unwrap();
    conn.execute("INSERT INTO people (id, name) VALUES (2, 'Bob')")
        .unwrap();

    let people = conn
        .query(Program::new(
            "SELECT id, name FROM people ORDER BY id",
            collect::<(i64, String)>(),
        ))
        .unwrap();
    assert_eq!(
        people,
        vec![(1, "Alice".to_string()), (2, "Bob".to_string())]
    );
}

#[test]
fn sqlite_bad_path_reports_cant_open_through_error_output() {
    let ctx = IoContext::new();
    let conn = Connection::<Sqlite>::new(&ctx);

    let code = conn.try_connect(BAD_PATH).unwrap_err();
    assert!(code.is_err());
    assert_eq!(code.category().name(), "sqlite");
    assert_eq!(SqliteErrc::primary_of(&code), Some(SqliteErrc::CantOpen));
}

#[test]
fn sqlite_bad_path_error_carries_the_same_code() {
    let ctx = IoContext::new();
    let conn = Connection::<Sqlite>::new(&ctx);

    let code = conn.try_connect(BAD_PATH).unwrap_err();
    let err = conn.connect(BAD_PATH).unwrap_err();
    assert_eq!(err.code(), code);
    assert_eq!(err.operation(), Some("connect()"));
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("connect()"));
}

#[test]
fn sqlite_syntax_error() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);

    let code = conn.try_execute("SELEKT nothing").unwrap_err();
    assert_eq!(code, SqliteErrc::Error);
    assert!(conn.last_error().contains("syntax"));

    match conn.prepare("SELECT FROM WHERE") {
        Err(Error::Driver(e)) => {
            assert_eq!(e.operation, "prepare()");
            assert!(e.message.contains("syntax"));
        }
        other => panic!("expected a driver error, got {other:?}"),
    }
}

#[test]
fn sqlite_last_error_is_clean_after_success() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    assert!(conn.try_execute("SELECT * FROM nowhere").is_err());
    assert_ne!(conn.last_error(), "not an error");
    conn.execute("SELECT 1").unwrap();
    assert_eq!(conn.last_error(), "not an error");
}

#[test]
fn sqlite_last_insert_rowid_and_changes() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    conn.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")
        .unwrap();

    let mut insert = conn.prepare("INSERT INTO items (label) VALUES (?)").unwrap();
    for (expected, label) in [(1, "a"), (2, "b"), (3, "c")] {
        insert.bind(0, label).unwrap();
        conn.execute(&mut insert).unwrap();
        assert_eq!(conn.last_insert_rowid(), expected);
    }

    conn.execute("UPDATE items SET label = 'z' WHERE id > 1").unwrap();
    assert_eq!(conn.changes(), 2);
}

#[test]
fn sqlite_named_binding() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    conn.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)").unwrap();

    let mut insert = conn.prepare("INSERT INTO kv (k, v) VALUES (:key, :value)").unwrap();
    assert_eq!(insert.parameter_count(), 2);
    insert.bind_named(":key", "answer").unwrap();
    insert.bind_named("value", 42_i64).unwrap();
    conn.execute(&mut insert).unwrap();

    let mut select = conn.prepare("SELECT v FROM kv WHERE k = @k").unwrap();
    select.bind_named("@k", "answer").unwrap();
    let v = conn.query(Program::new(&mut select, first::<i64>())).unwrap();
    assert_eq!(v, Some(42));
}

#[test]
fn sqlite_bind_out_of_range() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    let mut stmt = conn.prepare("SELECT ?, ?").unwrap();
    assert!(stmt.bind(1, 1_i64).is_ok());

    let err = stmt.bind(2, 1_i64).unwrap_err();
    assert!(matches!(err, Error::OutOfRange(_)), "got {err:?}");
    assert_eq!(err.code(), FrameworkErrc::OutOfRange);
    assert!(matches!(
        stmt.bind_named(":nope", 1_i64),
        Err(Error::OutOfRange(_))
    ));
}

#[test]
fn sqlite_statement_reuse_with_bind_all() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    conn.execute("CREATE TABLE pairs (a INTEGER, b TEXT)").unwrap();

    let mut insert = conn.prepare("INSERT INTO pairs VALUES (?, ?)").unwrap();
    for i in 0..5_i64 {
        insert
            .bind_all([Value::Integer(i), Value::Text(format!("n{i}"))])
            .unwrap();
        conn.execute(&mut insert).unwrap();
    }

    let total = conn
        .query(Program::new("SELECT sum(a) FROM pairs", first::<i64>()))
        .unwrap();
    assert_eq!(total, Some(10));
}

#[test]
fn sqlite_nulls_and_options() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    conn.execute("CREATE TABLE maybe (v INTEGER)").unwrap();
    let mut insert = conn.prepare("INSERT INTO maybe VALUES (?)").unwrap();
    insert.bind(0, Some(3_i64)).unwrap();
    conn.execute(&mut insert).unwrap();
    insert.bind(0, None::<i64>).unwrap();
    conn.execute(&mut insert).unwrap();

    let values = conn
        .query(Program::new(
            "SELECT v FROM maybe ORDER BY v IS NULL, v",
            collect::<Option<i64>>(),
        ))
        .unwrap();
    assert_eq!(values, [Some(3), None]);
}

#[test]
fn sqlite_datetime_stored_as_micros() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    let at = UNIX_EPOCH + Duration::from_micros(1_650_000_000_000_001);

    let mut stmt = conn.prepare("SELECT ?").unwrap();
    stmt.bind(0, at).unwrap();
    let stored = conn.query(Program::new(&mut stmt, first::<i64>())).unwrap();
    assert_eq!(stored, Some(1_650_000_000_000_001));
    assert_eq!(
        sqlbridge::sqlite::types::micros_to_datetime(stored.unwrap()),
        at
    );
    assert!(at < SystemTime::now());
}

#[test]
fn sqlite_row_width_mismatch_is_reported() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    let err = conn
        .query(Program::new("SELECT 1, 2, 3", collect::<(i64, i64)>()))
        .unwrap_err();
    assert_eq!(err.code(), FrameworkErrc::RowWidth);
}

#[test]
fn sqlite_empty_statement_cannot_run() {
    let ctx = IoContext::new();
    let conn = memory_connection(&ctx);
    let code = conn.try_execute(SqliteStatement::default()).unwrap_err();
    assert_eq!(code, FrameworkErrc::NotPrepared);
}

#[test]
fn sqlite_file_database_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");
    let path = path.to_string_lossy().into_owned();
    let ctx = IoContext::new();

    {
        let conn = Connection::<Sqlite>::new(&ctx);
        conn.connect(path.as_str()).unwrap();
        conn.execute("CREATE TABLE log (msg TEXT); INSERT INTO log VALUES ('hello');")
            .unwrap();
        conn.disconnect().unwrap();
    }

    let conn = Connection::<Sqlite>::new(&ctx);
    conn.connect(SqliteConfig::file(path.as_str()).flags(OpenFlags::read_only()))
        .unwrap();
    let msgs = conn
        .query(Program::new("SELECT msg FROM log", collect::<String>()))
        .unwrap();
    assert_eq!(msgs, ["hello"]);

    let code = conn.try_execute("INSERT INTO log VALUES ('x')").unwrap_err();
    assert_eq!(SqliteErrc::primary_of(&code), Some(SqliteErrc::Readonly));
}

#[test]
fn sqlite_connections_share_one_service_per_context() {
    let ctx = IoContext::new();
    let a = memory_connection(&ctx);
    let b = memory_connection(&ctx);
    assert!(std::sync::Arc::ptr_eq(a.service(), b.service()));
    assert!(!a.service().pool_started());

    // separate in-memory databases
    a.execute("CREATE TABLE only_a (v INTEGER)").unwrap();
    assert!(b.try_execute("SELECT * FROM only_a").is_err());
}
