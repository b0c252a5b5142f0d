//! SQLite result codes as a sqlbridge error category.

use crate::ffi;
use sqlbridge_core::{ErrorCategory, ErrorCode};
use std::ffi::c_int;

/// SQLite primary result codes and the extended codes callers most often
/// match on.
///
/// Codes reported by the driver keep SQLite's numeric values, so any code
/// the library can return is representable as an [`ErrorCode`] even when it
/// has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum SqliteErrc {
    Error = 1,
    Internal = 2,
    Perm = 3,
    Abort = 4,
    Busy = 5,
    Locked = 6,
    Nomem = 7,
    Readonly = 8,
    Interrupt = 9,
    Ioerr = 10,
    Corrupt = 11,
    NotFound = 12,
    Full = 13,
    CantOpen = 14,
    Protocol = 15,
    Empty = 16,
    Schema = 17,
    TooBig = 18,
    Constraint = 19,
    Mismatch = 20,
    Misuse = 21,
    Nolfs = 22,
    Auth = 23,
    Format = 24,
    Range = 25,
    NotADb = 26,
    Notice = 27,
    Warning = 28,

    BusyTimeout = 773,
    CantOpenIsDir = 526,
    CantOpenFullPath = 782,
    ConstraintForeignKey = 787,
    ConstraintNotNull = 1299,
    ConstraintPrimaryKey = 1555,
    ConstraintUnique = 2067,
    IoerrNomem = 3082,
    ReadonlyDbMoved = 1032,
}

impl SqliteErrc {
    /// Look up a result code, primary or extended.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Error,
            2 => Self::Internal,
            3 => Self::Perm,
            4 => Self::Abort,
            5 => Self::Busy,
            6 => Self::Locked,
            7 => Self::Nomem,
            8 => Self::Readonly,
            9 => Self::Interrupt,
            10 => Self::Ioerr,
            11 => Self::Corrupt,
            12 => Self::NotFound,
            13 => Self::Full,
            14 => Self::CantOpen,
            15 => Self::Protocol,
            16 => Self::Empty,
            17 => Self::Schema,
            18 => Self::TooBig,
            19 => Self::Constraint,
            20 => Self::Mismatch,
            21 => Self::Misuse,
            22 => Self::Nolfs,
            23 => Self::Auth,
            24 => Self::Format,
            25 => Self::Range,
            26 => Self::NotADb,
            27 => Self::Notice,
            28 => Self::Warning,
            773 => Self::BusyTimeout,
            526 => Self::CantOpenIsDir,
            782 => Self::CantOpenFullPath,
            787 => Self::ConstraintForeignKey,
            1299 => Self::ConstraintNotNull,
            1555 => Self::ConstraintPrimaryKey,
            2067 => Self::ConstraintUnique,
            3082 => Self::IoerrNomem,
            1032 => Self::ReadonlyDbMoved,
            _ => return None,
        })
    }

    /// The primary code an extended code refines. Primary codes map to
    /// themselves.
    pub fn primary(self) -> Self {
        Self::from_code(self as i32 & 0xff).unwrap_or(self)
    }

    /// The primary code of an error reported by this driver, if it is one.
    pub fn primary_of(code: &ErrorCode) -> Option<Self> {
        if code.is_in(&SqliteCategory) {
            Self::from_code(code.value() & 0xff)
        } else {
            None
        }
    }

    pub fn message(self) -> &'static str {
        ffi::error_string(self as c_int)
    }
}

/// Category for every code the SQLite driver reports.
pub struct SqliteCategory;

impl ErrorCategory for SqliteCategory {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn message(&self, value: i32) -> String {
        ffi::error_string(value).to_string()
    }

    fn is_fatal(&self, value: i32) -> bool {
        value & 0xff == ffi::SQLITE_NOMEM
    }
}

/// Code for a native result code.
pub(crate) fn code(rc: c_int) -> ErrorCode {
    ErrorCode::new(rc, &SqliteCategory)
}

impl From<SqliteErrc> for ErrorCode {
    fn from(errc: SqliteErrc) -> Self {
        code(errc as c_int)
    }
}

impl PartialEq<SqliteErrc> for ErrorCode {
    fn eq(&self, other: &SqliteErrc) -> bool {
        *self == ErrorCode::from(*other)
    }
}

impl PartialEq<ErrorCode> for SqliteErrc {
    fn eq(&self, other: &ErrorCode) -> bool {
        other == self
    }
}
