//! Prepared SQLite statements.

use crate::error::code;
use crate::ffi;
use crate::types;
use sqlbridge_core::{
    BindError, ColumnInfo, Error, FrameworkErrc, IntoValue, PreparedStatement, Result, Row,
    RowHandler, dispatch_row,
};
use std::ffi::{CString, c_int};
use std::ptr;
use std::sync::Arc;

/// A compiled statement owned by the caller.
///
/// The default statement is empty: it stands in for a failed prepare, has
/// no parameters, and refuses to bind or run. Parameter indexes are 0-based
/// here even though SQLite counts from 1.
///
/// A statement runs under its connection's lock, so it may be moved to a
/// worker thread along with the program that uses it.
pub struct SqliteStatement {
    raw: *mut ffi::sqlite3_stmt,
    sql: String,
}

// SAFETY: the handle is only stepped or bound through `&mut self`, and
// stepping happens while the owning connection's mutex is held. SQLite is
// opened in serialized mode, so the handle itself is not tied to a thread.
unsafe impl Send for SqliteStatement {}

/// Why a run stopped early.
pub(crate) enum RunError {
    /// SQLite returned this result code; its message is on the connection.
    Native(c_int),
    /// The statement could not run, or the handler rejected a row.
    Other(Error),
}

impl SqliteStatement {
    /// Wrap a handle returned by `sqlite3_prepare_v2`. A null handle
    /// (whitespace or comment-only text) is kept and runs as a no-op.
    pub(crate) fn from_raw(raw: *mut ffi::sqlite3_stmt, sql: impl Into<String>) -> Self {
        Self {
            raw,
            sql: sql.into(),
        }
    }

    pub(crate) fn raw(&self) -> *mut ffi::sqlite3_stmt {
        self.raw
    }

    fn prepared(&self, operation: &'static str) -> Result<*mut ffi::sqlite3_stmt> {
        if self.raw.is_null() {
            Err(Error::from_code(
                operation,
                FrameworkErrc::NotPrepared.into(),
                "statement is not prepared",
            ))
        } else {
            Ok(self.raw)
        }
    }

    /// Bind `value` to the parameter at 0-based `index`.
    #[allow(clippy::result_large_err)]
    pub fn bind(&mut self, index: usize, value: impl IntoValue) -> Result<()> {
        let raw = self.prepared("bind()")?;
        let parameter = index.to_string();
        let Some(position) = index.checked_add(1).and_then(|p| c_int::try_from(p).ok()) else {
            return Err(bind_failure(raw, ffi::SQLITE_RANGE, parameter));
        };
        let value = value.into_value();
        // SAFETY: raw is a live statement owned by self
        let rc = unsafe { types::bind_value(raw, position, &value) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(bind_failure(raw, rc, parameter))
        }
    }

    /// Bind by parameter name. The name may be given with its prefix
    /// (`":id"`, `"@id"`, `"$id"`) or without, in which case `:` is assumed.
    #[allow(clippy::result_large_err)]
    pub fn bind_named(&mut self, name: &str, value: impl IntoValue) -> Result<()> {
        let raw = self.prepared("bind()")?;
        let position = self.parameter_index(name);
        if position == 0 {
            return Err(bind_failure(raw, ffi::SQLITE_RANGE, name.to_string()));
        }
        let value = value.into_value();
        // SAFETY: raw is live and position came from SQLite itself
        let rc = unsafe { types::bind_value(raw, position, &value) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(bind_failure(raw, rc, name.to_string()))
        }
    }

    fn parameter_index(&self, name: &str) -> c_int {
        let lookup = |candidate: &str| {
            let Ok(c_name) = CString::new(candidate) else {
                return 0;
            };
            // SAFETY: raw is live and c_name is nul-terminated
            unsafe { ffi::sqlite3_bind_parameter_index(self.raw, c_name.as_ptr()) }
        };
        match lookup(name) {
            0 if !name.starts_with([':', '@', '$', '?']) => lookup(&format!(":{name}")),
            found => found,
        }
    }

    /// Bind each value in order starting at index 0.
    #[allow(clippy::result_large_err)]
    pub fn bind_all<I>(&mut self, values: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: IntoValue,
    {
        for (index, value) in values.into_iter().enumerate() {
            self.bind(index, value)?;
        }
        Ok(())
    }

    /// Reset every parameter to NULL.
    pub fn clear_bindings(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: raw is live
            unsafe { ffi::sqlite3_clear_bindings(self.raw) };
        }
    }

    /// Step through every result row, handing each to `handler`.
    ///
    /// The statement is reset afterwards whatever the outcome, keeping its
    /// bindings so it can be run again.
    pub(crate) fn run<H: RowHandler>(&mut self, handler: &mut H) -> std::result::Result<(), RunError> {
        if self.raw.is_null() {
            if self.sql.is_empty() {
                return Err(RunError::Other(Error::from_code(
                    "execute()",
                    FrameworkErrc::NotPrepared.into(),
                    "statement is not prepared",
                )));
            }
            return Ok(());
        }

        let outcome = self.step_all(handler);
        // SAFETY: raw is live; reset reports the last step's error, which
        // step_all has already captured
        unsafe { ffi::sqlite3_reset(self.raw) };
        outcome
    }

    fn step_all<H: RowHandler>(&mut self, handler: &mut H) -> std::result::Result<(), RunError> {
        let raw = self.raw;
        // SAFETY: raw is live for the whole loop
        let width = unsafe { ffi::sqlite3_column_count(raw) };
        let columns = Arc::new(ColumnInfo::new(
            (0..width)
                .map(|i| {
                    // SAFETY: i is within the column count
                    unsafe { types::column_name(raw, i) }.unwrap_or_else(|| format!("col{i}"))
                })
                .collect(),
        ));

        loop {
            // SAFETY: raw is live
            match unsafe { ffi::sqlite3_step(raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..width)
                        // SAFETY: step just returned SQLITE_ROW and i is in range
                        .map(|i| unsafe { types::read_column(raw, i) })
                        .collect();
                    let row = Row::with_columns(Arc::clone(&columns), values);
                    tracing::trace!(width, "sqlite row");
                    dispatch_row(handler, row).map_err(RunError::Other)?;
                }
                ffi::SQLITE_DONE => return Ok(()),
                rc => return Err(RunError::Native(rc)),
            }
        }
    }
}

fn bind_failure(raw: *mut ffi::sqlite3_stmt, rc: c_int, parameter: String) -> Error {
    let message = ffi::error_string(rc).to_string();
    match rc & 0xff {
        ffi::SQLITE_RANGE => Error::OutOfRange(BindError { parameter, message }),
        ffi::SQLITE_TOOBIG => Error::TooLarge(BindError { parameter, message }),
        _ => {
            // SAFETY: a live statement always has a live owning connection
            let message = unsafe { ffi::errmsg(ffi::sqlite3_db_handle(raw)) };
            Error::from_code("bind()", code(rc), message)
        }
    }
}

impl Default for SqliteStatement {
    fn default() -> Self {
        Self::from_raw(ptr::null_mut(), String::new())
    }
}

impl PreparedStatement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn parameter_count(&self) -> usize {
        if self.raw.is_null() {
            return 0;
        }
        // SAFETY: raw is live
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.raw) };
        usize::try_from(count).unwrap_or(0)
    }
}

impl Drop for SqliteStatement {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: raw is live and never used again
            unsafe { ffi::sqlite3_finalize(self.raw) };
        }
    }
}

impl std::fmt::Debug for SqliteStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStatement")
            .field("sql", &self.sql)
            .field("prepared", &!self.raw.is_null())
            .finish()
    }
}
