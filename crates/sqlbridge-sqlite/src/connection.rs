//! SQLite connection resource.
//!
//! [`SqliteConnection`] is the per-connection state the [`Sqlite`] driver
//! keeps behind a sqlbridge `Connection`: the native handle and the text of
//! the last failure, guarded by one mutex.
//!
//! [`Sqlite`]: crate::Sqlite

#![allow(clippy::borrow_as_ptr)] // out-parameters of sqlite3_open_v2 and prepare

use crate::error::{SqliteErrc, code};
use crate::ffi;
use crate::statement::{RunError, SqliteStatement};
use sqlbridge_core::{ErrorCode, FrameworkErrc, RowHandler};
use std::ffi::{CString, c_int};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where and how [`Sqlite`](crate::Sqlite) opens a database.
///
/// Any `&str`, `String` or `&Path` converts into a file config, so
/// `conn.connect(":memory:")` works directly.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// File path, URI (with [`OpenFlags::uri`]) or `":memory:"`.
    pub path: String,
    pub flags: OpenFlags,
    /// How long a statement waits on a locked database before failing
    /// with `SqliteErrc::Busy`. Zero disables waiting.
    pub busy_timeout_ms: u32,
}

/// Access mode and options passed to `sqlite3_open_v2`.
///
/// With neither `read_only` nor `read_write` set the database is opened
/// read-write and created if missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read_only: bool,
    /// Open an existing database for writing; fails if it does not exist
    /// unless `create` is also set.
    pub read_write: bool,
    pub create: bool,
    /// Interpret the path as a `file:` URI.
    pub uri: bool,
    pub shared_cache: bool,
    pub private_cache: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Read-write on an existing database.
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Self::default()
        }
    }

    /// Read-write, creating the file if needed.
    pub fn create_read_write() -> Self {
        Self {
            create: true,
            ..Self::read_write()
        }
    }

    /// Enable URI filenames such as `file:data.db?mode=ro`.
    pub fn uri(mut self) -> Self {
        self.uri = true;
        self
    }

    /// Native flag bits. Handles are always opened in serialized mode
    /// because they move between the caller and the worker pool.
    fn to_sqlite_flags(self) -> c_int {
        let options = [
            (self.read_only, ffi::SQLITE_OPEN_READONLY),
            (self.read_write, ffi::SQLITE_OPEN_READWRITE),
            (self.create, ffi::SQLITE_OPEN_CREATE),
            (self.uri, ffi::SQLITE_OPEN_URI),
            (self.shared_cache, ffi::SQLITE_OPEN_SHAREDCACHE),
            (self.private_cache, ffi::SQLITE_OPEN_PRIVATECACHE),
        ];
        let mut flags = options
            .iter()
            .filter(|(enabled, _)| *enabled)
            .fold(ffi::SQLITE_OPEN_FULLMUTEX, |acc, (_, bit)| acc | bit);

        if !self.read_only && !self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::file(":memory:")
    }
}

impl SqliteConfig {
    /// A database at `path`, created if missing.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }

    /// A private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

impl From<&str> for SqliteConfig {
    fn from(path: &str) -> Self {
        Self::file(path)
    }
}

impl From<String> for SqliteConfig {
    fn from(path: String) -> Self {
        Self::file(path)
    }
}

impl From<&std::path::Path> for SqliteConfig {
    fn from(path: &std::path::Path) -> Self {
        Self::file(path.to_string_lossy())
    }
}

struct Inner {
    db: *mut ffi::sqlite3,
    path: Option<String>,
    last_error: Option<String>,
}

// SAFETY: SQLite handles opened with SQLITE_OPEN_FULLMUTEX may be used from
// any thread, and all access goes through the Mutex.
unsafe impl Send for Inner {}

impl Inner {
    fn open_db(&mut self) -> Result<*mut ffi::sqlite3, ErrorCode> {
        self.last_error = None;
        if self.db.is_null() {
            Err(FrameworkErrc::NotConnected.into())
        } else {
            Ok(self.db)
        }
    }

    /// Record the handle's message for `rc` and return its code.
    fn fail(&mut self, rc: c_int) -> ErrorCode {
        let message = if self.db.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: db is live
            unsafe { ffi::errmsg(self.db) }
        };
        self.fail_with(code(rc), message)
    }

    fn fail_with(&mut self, code: ErrorCode, message: String) -> ErrorCode {
        tracing::debug!(code = code.value(), %message, "sqlite error");
        self.last_error = Some(message);
        code
    }

    fn close(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is live; close_v2 defers the actual close until
            // every outstanding statement is finalized
            unsafe { ffi::sqlite3_close_v2(self.db) };
            self.db = ptr::null_mut();
        }
    }
}

/// A native SQLite connection, possibly not yet open.
///
/// All access goes through an internal mutex, so one handle may be used
/// from the caller's thread and from worker threads in turn.
pub struct SqliteConnection {
    inner: Mutex<Inner>,
}

impl Default for SqliteConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteConnection {
    /// A closed connection.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                db: ptr::null_mut(),
                path: None,
                last_error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        !self.lock().db.is_null()
    }

    /// Path of the open database.
    pub fn path(&self) -> Option<String> {
        self.lock().path.clone()
    }

    /// Open the database described by `config`, closing any handle already
    /// open.
    pub fn open(&self, config: &SqliteConfig) -> Result<(), ErrorCode> {
        let mut inner = self.lock();
        inner.close();
        inner.path = None;
        inner.last_error = None;

        let Ok(c_path) = CString::new(config.path.as_str()) else {
            return Err(inner.fail_with(
                SqliteErrc::CantOpen.into(),
                "invalid path: contains null byte".to_string(),
            ));
        };

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: c_path is nul-terminated and db is a valid out-pointer
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let message = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: a failed open still hands back a handle that
                // carries the message and must be closed
                unsafe {
                    let message = ffi::errmsg(db);
                    ffi::sqlite3_close(db);
                    message
                }
            };
            tracing::debug!(path = %config.path, rc, "sqlite open failed");
            return Err(inner.fail_with(code(rc), message));
        }

        // SAFETY: db is valid
        unsafe {
            ffi::sqlite3_extended_result_codes(db, 1);
            if config.busy_timeout_ms > 0 {
                ffi::sqlite3_busy_timeout(
                    db,
                    c_int::try_from(config.busy_timeout_ms).unwrap_or(c_int::MAX),
                );
            }
        }

        inner.db = db;
        inner.path = Some(config.path.clone());
        tracing::debug!(path = %config.path, "sqlite database opened");
        Ok(())
    }

    /// Close the handle. Closing a closed connection succeeds.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.close();
        inner.path = None;
        inner.last_error = None;
    }

    /// Compile the first statement in `sql`.
    pub fn prepare(&self, sql: &str) -> Result<SqliteStatement, ErrorCode> {
        let mut inner = self.lock();
        let db = inner.open_db()?;
        let (stmt, _) = prepare_one(&mut inner, db, sql)?;
        Ok(stmt)
    }

    /// Run every statement in `sql` in order, passing all result rows to
    /// `handler`. Stops at the first failure.
    pub fn exec<H: RowHandler>(&self, sql: &str, handler: &mut H) -> Result<(), ErrorCode> {
        let mut inner = self.lock();
        let db = inner.open_db()?;
        let mut rest = sql;
        while !rest.trim().is_empty() {
            let (mut stmt, consumed) = prepare_one(&mut inner, db, rest)?;
            run(&mut inner, &mut stmt, handler)?;
            if consumed == 0 {
                break;
            }
            rest = &rest[consumed..];
        }
        Ok(())
    }

    /// Run a statement prepared on this connection.
    pub fn run<H: RowHandler>(
        &self,
        stmt: &mut SqliteStatement,
        handler: &mut H,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.lock();
        let db = inner.open_db()?;
        if !stmt.raw().is_null() {
            // SAFETY: raw is live
            let owner = unsafe { ffi::sqlite3_db_handle(stmt.raw()) };
            if owner != db {
                return Err(inner.fail_with(
                    SqliteErrc::Misuse.into(),
                    "statement was prepared on a different connection".to_string(),
                ));
            }
        }
        run(&mut inner, stmt, handler)
    }

    /// Message for the most recent failure, `"not an error"` when the last
    /// operation succeeded.
    pub fn last_error(&self) -> String {
        self.lock()
            .last_error
            .clone()
            .unwrap_or_else(|| ffi::error_string(ffi::SQLITE_OK).to_string())
    }

    /// Rowid of the most recent successful INSERT, 0 if none.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.lock();
        if inner.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        let inner = self.lock();
        if inner.db.is_null() {
            return 0;
        }
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes64(inner.db) };
        u64::try_from(changes).unwrap_or(0)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.lock().close();
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path())
            .finish()
    }
}

/// Prepare the first statement of `sql`, returning it with the number of
/// bytes it consumed.
fn prepare_one(
    inner: &mut Inner,
    db: *mut ffi::sqlite3,
    sql: &str,
) -> Result<(SqliteStatement, usize), ErrorCode> {
    let Ok(len) = c_int::try_from(sql.len()) else {
        return Err(inner.fail_with(
            SqliteErrc::TooBig.into(),
            "SQL text too long".to_string(),
        ));
    };

    let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
    let mut tail: *const std::ffi::c_char = ptr::null();

    // SAFETY: sql outlives the call and len bounds it, so no terminator is
    // needed; tail points into the same buffer on return
    let rc = unsafe { ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast(), len, &mut raw, &mut tail) };

    if rc != ffi::SQLITE_OK {
        return Err(inner.fail(rc));
    }

    let consumed = if tail.is_null() {
        sql.len()
    } else {
        (tail as usize).saturating_sub(sql.as_ptr() as usize).min(sql.len())
    };
    let text = sql[..consumed].trim();
    tracing::trace!(sql = text, "sqlite prepared");
    Ok((SqliteStatement::from_raw(raw, text), consumed))
}

fn run<H: RowHandler>(
    inner: &mut Inner,
    stmt: &mut SqliteStatement,
    handler: &mut H,
) -> Result<(), ErrorCode> {
    match stmt.run(handler) {
        Ok(()) => Ok(()),
        Err(RunError::Native(rc)) => Err(inner.fail(rc)),
        Err(RunError::Other(e)) => {
            let errc = e.code();
            Err(inner.fail_with(errc, e.to_string()))
        }
    }
}
