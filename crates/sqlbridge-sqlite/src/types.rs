//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has 5 storage classes (INTEGER, REAL, TEXT, BLOB and NULL), which
//! map one-to-one onto the matching [`Value`] tags. [`Value::DateTime`] has
//! no storage class of its own and is stored as INTEGER microseconds since
//! the Unix epoch; reading it back yields an integer that
//! [`micros_to_datetime`] converts.

use crate::ffi;
use sqlbridge_core::Value;
use std::ffi::{CStr, c_int};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bind a Value to a prepared statement parameter.
///
/// Text and blobs are copied by SQLite before this returns.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` is 1-based; SQLite rejects invalid indexes with `SQLITE_RANGE`
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: caller guarantees stmt is live; pointers passed for text and
    // blobs stay valid for the call and SQLITE_TRANSIENT makes SQLite copy
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),

            Value::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, *v),

            Value::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),

            Value::Text(s) => {
                let Ok(len) = c_int::try_from(s.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    s.as_ptr().cast(),
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            }

            Value::Blob(b) => {
                let Ok(len) = c_int::try_from(b.len()) else {
                    return ffi::SQLITE_TOOBIG;
                };
                if b.is_empty() {
                    // a null pointer would bind NULL instead of an empty blob
                    return ffi::sqlite3_bind_zeroblob(stmt, index, 0);
                }
                ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    b.as_ptr().cast(),
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            }

            Value::DateTime(t) => ffi::sqlite3_bind_int64(stmt, index, datetime_to_micros(*t)),
        }
    }
}

/// Read a column value from the current result row.
///
/// # Safety
/// - `stmt` must be a valid statement that just returned `SQLITE_ROW`
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees stmt is positioned on a row; the text and
    // blob pointers are valid until the next step, and we copy out of them
    // before returning
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, index)),
            ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = column_len(stmt, index);
                if ptr.is_null() {
                    Value::Text(String::new())
                } else {
                    let bytes = std::slice::from_raw_parts(ptr, len);
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = column_len(stmt, index);
                if ptr.is_null() {
                    Value::Blob(Vec::new())
                } else {
                    Value::Blob(std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt is live; the name pointer is owned by
    // SQLite and copied here
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}

unsafe fn column_len(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> usize {
    // SAFETY: same contract as read_column
    let len = unsafe { ffi::sqlite3_column_bytes(stmt, index) };
    usize::try_from(len).unwrap_or(0)
}

/// Microseconds since the Unix epoch, negative before it. Saturates at the
/// `i64` range.
pub fn datetime_to_micros(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_micros()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_micros()).map_or(i64::MIN, |m| -m),
    }
}

/// Inverse of [`datetime_to_micros`].
pub fn micros_to_datetime(micros: i64) -> SystemTime {
    let magnitude = Duration::from_micros(micros.unsigned_abs());
    if micros >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_micros() {
        assert_eq!(datetime_to_micros(UNIX_EPOCH), 0);

        let later = UNIX_EPOCH + Duration::from_micros(1_700_000_000_123_456);
        assert_eq!(datetime_to_micros(later), 1_700_000_000_123_456);
        assert_eq!(micros_to_datetime(1_700_000_000_123_456), later);

        let earlier = UNIX_EPOCH - Duration::from_secs(86_400);
        assert_eq!(datetime_to_micros(earlier), -86_400_000_000);
        assert_eq!(micros_to_datetime(-86_400_000_000), earlier);
    }

    #[test]
    fn test_datetime_drops_sub_micro_precision() {
        let t = UNIX_EPOCH + Duration::from_nanos(1_500);
        assert_eq!(datetime_to_micros(t), 1);
    }
}
