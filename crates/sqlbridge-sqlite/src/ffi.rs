//! Low-level bindings to libsqlite3.
//!
//! The raw declarations come from `libsqlite3-sys`, built against the
//! bundled amalgamation. This module re-exports them and adds the few safe
//! helpers the driver needs for version and message text.

use std::ffi::{CStr, c_int};

pub use libsqlite3_sys::*;

// libsqlite3-sys omits sqlite3_close_v2 from its prebuilt bindings; the
// bundled amalgamation still exports the symbol.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// Version of the linked library, e.g. `"3.46.0"`.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static string
    unsafe {
        let ptr = sqlite3_libversion();
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown")
    }
}

/// Linked library version encoded as `X * 1_000_000 + Y * 1000 + Z`.
pub fn version_number() -> i32 {
    // SAFETY: no arguments, no preconditions
    unsafe { sqlite3_libversion_number() }
}

/// English text for a primary or extended result code.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string for every input
    unsafe {
        let ptr = sqlite3_errstr(code);
        if ptr.is_null() {
            return "unknown error";
        }
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}

/// The connection's message for its most recent failed call.
///
/// # Safety
/// `db` must be a live handle returned by `sqlite3_open_v2`.
pub(crate) unsafe fn errmsg(db: *mut sqlite3) -> String {
    // SAFETY: caller guarantees db is live; errmsg never returns a dangling
    // pointer while the handle is open
    unsafe {
        let ptr = sqlite3_errmsg(db);
        if ptr.is_null() {
            return error_string(SQLITE_NOMEM).to_string();
        }
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
