//! The SQLite [`Driver`].

use crate::connection::{SqliteConfig, SqliteConnection};
use crate::error::SqliteCategory;
use crate::statement::SqliteStatement;
use sqlbridge_core::{
    Connection, Driver, ErrorCategory, ErrorCode, Program, Query, QueryRef, RowHandler,
};

/// SQLite backend.
///
/// Blocking calls run on the service's worker pool in the asynchronous
/// forms; the default async operations of [`Driver`] are used unchanged.
///
/// ```rust,ignore
/// use sqlbridge_core::{Connection, IoContext, collect, Program};
/// use sqlbridge_sqlite::Sqlite;
///
/// let ctx = IoContext::new();
/// let conn = Connection::<Sqlite>::new(&ctx);
/// conn.connect(":memory:")?;
/// conn.execute("CREATE TABLE t (v INTEGER)")?;
/// let rows = conn.query(Program::new("SELECT v FROM t", collect::<i64>()))?;
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct Sqlite;

impl Driver for Sqlite {
    type Implementation = SqliteConnection;
    type ConnectArg = SqliteConfig;
    type Statement = SqliteStatement;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn error_category(&self) -> &'static dyn ErrorCategory {
        &SqliteCategory
    }

    fn create_implementation(&self) -> SqliteConnection {
        SqliteConnection::new()
    }

    fn connect(&self, implementation: &SqliteConnection, arg: &SqliteConfig) -> Result<(), ErrorCode> {
        implementation.open(arg)
    }

    fn disconnect(&self, implementation: &SqliteConnection) -> Result<(), ErrorCode> {
        implementation.close();
        Ok(())
    }

    fn prepare(&self, implementation: &SqliteConnection, sql: &str) -> Result<SqliteStatement, ErrorCode> {
        implementation.prepare(sql)
    }

    fn execute<Q, H>(
        &self,
        implementation: &SqliteConnection,
        program: &mut Program<Q, H>,
    ) -> Result<(), ErrorCode>
    where
        Q: Query<SqliteStatement>,
        H: RowHandler,
    {
        let (query, handler) = program.parts_mut();
        match query.as_query() {
            QueryRef::Text(sql) => implementation.exec(sql, handler),
            QueryRef::Statement(stmt) => implementation.run(stmt, handler),
        }
    }

    fn last_error(&self, implementation: &SqliteConnection) -> String {
        implementation.last_error()
    }
}

/// SQLite-specific operations on a sqlbridge connection.
pub trait SqliteConnectionExt {
    /// Rowid of the most recent successful INSERT on this connection.
    fn last_insert_rowid(&self) -> i64;

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    fn changes(&self) -> u64;
}

impl SqliteConnectionExt for Connection<Sqlite> {
    fn last_insert_rowid(&self) -> i64 {
        self.implementation().last_insert_rowid()
    }

    fn changes(&self) -> u64 {
        self.implementation().changes()
    }
}
