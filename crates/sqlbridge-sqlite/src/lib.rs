//! SQLite driver for sqlbridge.
//!
// FFI bindings require unsafe code - this is expected for database drivers
#![allow(unsafe_code)]
//!
//! This crate implements the sqlbridge [`Driver`](sqlbridge_core::Driver)
//! contract on top of libsqlite3, compiled from the bundled amalgamation by
//! `libsqlite3-sys`.
//!
//! # Features
//!
//! - Synchronous, error-output and asynchronous forms of every operation
//!   through `sqlbridge_core::Connection<Sqlite>`
//! - Prepared statements with binding by 0-based index or by name
//! - Multi-statement query text
//! - In-memory and file-based databases
//! - Configurable open flags and busy timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlbridge_core::{Connection, IoContext, Program, collect};
//! use sqlbridge_sqlite::{Sqlite, SqliteConnectionExt};
//!
//! let ctx = IoContext::new();
//! let conn = Connection::<Sqlite>::new(&ctx);
//! conn.connect(":memory:")?;
//! conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let mut insert = conn.prepare("INSERT INTO users (name) VALUES (?)")?;
//! insert.bind(0, "Alice")?;
//! conn.execute(&mut insert)?;
//! assert_eq!(conn.last_insert_rowid(), 1);
//!
//! let users = conn.query(Program::new(
//!     "SELECT id, name FROM users",
//!     collect::<(i64, String)>(),
//! ))?;
//! ```
//!
//! # Type Mapping
//!
//! | `Value` tag | SQLite storage class |
//! |-------------|----------------------|
//! | `Null` | NULL |
//! | `Integer` | INTEGER |
//! | `Real` | REAL |
//! | `Text` | TEXT |
//! | `Blob` | BLOB |
//! | `DateTime` | INTEGER (microseconds since the Unix epoch) |
//!
//! # Thread Safety
//!
//! Handles are opened in serialized mode and guarded by a mutex inside
//! [`SqliteConnection`], so the driver's blocking work can move between
//! the caller's thread and the worker pool.

pub mod connection;
pub mod driver;
pub mod error;
pub mod ffi;
pub mod statement;
pub mod types;

pub use connection::{OpenFlags, SqliteConfig, SqliteConnection};
pub use driver::{Sqlite, SqliteConnectionExt};
pub use error::{SqliteCategory, SqliteErrc};
pub use statement::SqliteStatement;

/// Re-export the SQLite library version.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// Re-export the SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(version.starts_with('3'));
        assert!(sqlite_version_number() >= 3_037_000);
    }
}
