//! Error types for sqlbridge operations.
//!
//! Errors come in two layers:
//!
//! - [`ErrorCode`] is a numeric code paired with the [`ErrorCategory`] that
//!   defines it. Error-output forms and asynchronous completions deliver
//!   errors this way, so callers can compare them against a driver's own
//!   code enumeration.
//! - [`Error`] is what the convenience forms return. It carries the failing
//!   operation's label and the backend's message text.

use std::fmt;

/// A family of error codes.
///
/// Each driver supplies one category with stable numeric values and
/// human-readable messages. Value `0` is reserved for success in every
/// category.
pub trait ErrorCategory: Sync + 'static {
    /// Short category name, e.g. `"sqlite"`.
    fn name(&self) -> &'static str;

    /// Message text for a code in this category.
    fn message(&self, value: i32) -> String;

    /// Whether a code reports an unrecoverable condition such as allocation
    /// failure.
    fn is_fatal(&self, _value: i32) -> bool {
        false
    }
}

/// A numeric error code tagged with its category.
#[derive(Clone, Copy)]
pub struct ErrorCode {
    value: i32,
    category: &'static dyn ErrorCategory,
}

impl ErrorCode {
    /// Create a code in the given category.
    pub fn new(value: i32, category: &'static dyn ErrorCategory) -> Self {
        Self { value, category }
    }

    /// The zero code.
    pub fn success() -> Self {
        Self::new(0, &FrameworkCategory)
    }

    /// Collapse a unit result into a code, zero on success.
    pub fn from_result(result: &std::result::Result<(), ErrorCode>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(code) => *code,
        }
    }

    /// Convert back into a result, `Err` for any non-zero code.
    pub fn into_result(self) -> std::result::Result<(), ErrorCode> {
        if self.is_err() { Err(self) } else { Ok(()) }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn category(&self) -> &'static dyn ErrorCategory {
        self.category
    }

    pub fn is_ok(&self) -> bool {
        self.value == 0
    }

    pub fn is_err(&self) -> bool {
        self.value != 0
    }

    /// Whether the category classifies this code as unrecoverable.
    pub fn is_fatal(&self) -> bool {
        self.is_err() && self.category.is_fatal(self.value)
    }

    /// The category's message for this code.
    pub fn message(&self) -> String {
        self.category.message(self.value)
    }

    /// Whether this code belongs to `category`.
    pub fn is_in(&self, category: &dyn ErrorCategory) -> bool {
        self.category.name() == category.name()
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        Self::success()
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        if self.value == 0 && other.value == 0 {
            return true;
        }
        self.value == other.value && self.is_in(other.category)
    }
}

impl Eq for ErrorCode {}

impl fmt::Debug for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCode")
            .field("category", &self.category.name())
            .field("value", &self.value)
            .field("message", &self.message())
            .finish()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error {}: {}",
            self.category.name(),
            self.value,
            self.message()
        )
    }
}

impl std::error::Error for ErrorCode {}

/// Codes raised by the framework itself rather than by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FrameworkErrc {
    /// Operation requires an open connection.
    NotConnected = 1,
    /// Value read as a type that does not match its tag.
    InvalidAccess = 2,
    /// Row width does not match the requested shape.
    RowWidth = 3,
    /// Value decoded but not representable in the target type.
    Conversion = 4,
    /// Bind index or name outside the statement's parameters.
    OutOfRange = 5,
    /// Bound value exceeds backend limits.
    TooLarge = 6,
    /// The service has been shut down and accepts no more work.
    ShutDown = 7,
    /// The statement has no prepared query behind it.
    NotPrepared = 8,
    /// Memory could not be allocated.
    AllocationFailure = 9,
    /// Operation abandoned before completion.
    Cancelled = 10,
    /// Application-defined failure.
    Other = 11,
}

impl FrameworkErrc {
    fn from_value(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::NotConnected,
            2 => Self::InvalidAccess,
            3 => Self::RowWidth,
            4 => Self::Conversion,
            5 => Self::OutOfRange,
            6 => Self::TooLarge,
            7 => Self::ShutDown,
            8 => Self::NotPrepared,
            9 => Self::AllocationFailure,
            10 => Self::Cancelled,
            11 => Self::Other,
            _ => return None,
        })
    }
}

struct FrameworkCategory;

impl ErrorCategory for FrameworkCategory {
    fn name(&self) -> &'static str {
        "sqlbridge"
    }

    fn message(&self, value: i32) -> String {
        let text = match FrameworkErrc::from_value(value) {
            _ if value == 0 => "success",
            Some(FrameworkErrc::NotConnected) => "connection is not open",
            Some(FrameworkErrc::InvalidAccess) => "value accessed as the wrong type",
            Some(FrameworkErrc::RowWidth) => "row width does not match the requested shape",
            Some(FrameworkErrc::Conversion) => "value is not representable in the requested type",
            Some(FrameworkErrc::OutOfRange) => "bind parameter out of range",
            Some(FrameworkErrc::TooLarge) => "bound value too large",
            Some(FrameworkErrc::ShutDown) => "service has been shut down",
            Some(FrameworkErrc::NotPrepared) => "statement is not prepared",
            Some(FrameworkErrc::AllocationFailure) => "memory allocation failed",
            Some(FrameworkErrc::Cancelled) => "operation cancelled",
            Some(FrameworkErrc::Other) => "operation failed",
            None => "unknown error",
        };
        text.to_string()
    }

    fn is_fatal(&self, value: i32) -> bool {
        value == FrameworkErrc::AllocationFailure as i32
    }
}

impl From<FrameworkErrc> for ErrorCode {
    fn from(errc: FrameworkErrc) -> Self {
        ErrorCode::new(errc as i32, &FrameworkCategory)
    }
}

impl PartialEq<FrameworkErrc> for ErrorCode {
    fn eq(&self, other: &FrameworkErrc) -> bool {
        *self == ErrorCode::from(*other)
    }
}

/// The error type returned by convenience forms and awaited completions.
#[derive(Debug)]
pub enum Error {
    /// A backend reported a failure for an operation.
    Driver(DriverError),
    /// A value was read as a type that does not match its tag.
    InvalidAccess(InvalidAccess),
    /// A row did not have the width the requested shape needs.
    RowWidth(RowWidthError),
    /// A value decoded but could not be represented in the target type.
    Type(TypeError),
    /// Bind index or name outside the statement's parameter slots.
    OutOfRange(BindError),
    /// Bound value exceeds backend limits.
    TooLarge(BindError),
    /// Unrecoverable failure (allocation). Never downgraded to `Driver`.
    Fatal(FatalError),
    /// Operation was abandoned before it completed.
    Cancelled,
    /// Custom error with message
    Custom(String),
}

#[derive(Debug, Clone)]
pub struct DriverError {
    /// Label of the failing operation, e.g. `"connect()"`.
    pub operation: &'static str,
    pub code: ErrorCode,
    /// Backend message text.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidAccess {
    pub expected: &'static str,
    pub actual: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowWidthError {
    pub expected: usize,
    pub actual: usize,
}

#[derive(Debug, Clone)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
}

#[derive(Debug, Clone)]
pub struct BindError {
    /// Parameter index (0-based) or name.
    pub parameter: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct FatalError {
    pub operation: &'static str,
    pub code: ErrorCode,
}

impl Error {
    /// Build the error for a failed operation.
    ///
    /// Codes the category marks fatal become [`Error::Fatal`]; everything
    /// else becomes [`Error::Driver`] with the given message.
    pub fn from_code(operation: &'static str, code: ErrorCode, message: impl Into<String>) -> Self {
        if code.is_fatal() {
            tracing::error!(
                operation,
                category = code.category().name(),
                code = code.value(),
                "fatal error reported by backend"
            );
            Error::Fatal(FatalError { operation, code })
        } else {
            Error::Driver(DriverError {
                operation,
                code,
                message: message.into(),
            })
        }
    }

    /// The code equivalent of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Driver(e) => e.code,
            Error::InvalidAccess(_) => FrameworkErrc::InvalidAccess.into(),
            Error::RowWidth(_) => FrameworkErrc::RowWidth.into(),
            Error::Type(_) => FrameworkErrc::Conversion.into(),
            Error::OutOfRange(_) => FrameworkErrc::OutOfRange.into(),
            Error::TooLarge(_) => FrameworkErrc::TooLarge.into(),
            Error::Fatal(e) => e.code,
            Error::Cancelled => FrameworkErrc::Cancelled.into(),
            Error::Custom(_) => FrameworkErrc::Other.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }

    /// The operation label, for errors raised by a connection operation.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Error::Driver(e) => Some(e.operation),
            Error::Fatal(e) => Some(e.operation),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Driver(e) => write!(f, "{}", e),
            Error::InvalidAccess(e) => write!(f, "{}", e),
            Error::RowWidth(e) => write!(f, "{}", e),
            Error::Type(e) => write!(f, "Type error: expected {}, found {}", e.expected, e.actual),
            Error::OutOfRange(e) => {
                write!(f, "Bind parameter {} out of range: {}", e.parameter, e.message)
            }
            Error::TooLarge(e) => {
                write!(f, "Value for parameter {} too large: {}", e.parameter, e.message)
            }
            Error::Fatal(e) => write!(f, "{}: fatal error: {}", e.operation, e.code.message()),
            Error::Cancelled => write!(f, "Operation cancelled"),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Driver(e) => Some(&e.code),
            Error::Fatal(e) => Some(&e.code),
            _ => None,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl fmt::Display for InvalidAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot get a {} value from a non-{} value object (Type is {})",
            self.expected, self.expected, self.actual
        )
    }
}

impl fmt::Display for RowWidthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.expected == 1 {
            write!(
                f,
                "Cannot read single value from row of width != 1 (width is {})",
                self.actual
            )
        } else {
            write!(
                f,
                "Row width mismatch: expected {} columns, found {}",
                self.expected, self.actual
            )
        }
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Driver(err)
    }
}

impl From<InvalidAccess> for Error {
    fn from(err: InvalidAccess) -> Self {
        Error::InvalidAccess(err)
    }
}

impl From<RowWidthError> for Error {
    fn from(err: RowWidthError) -> Self {
        Error::RowWidth(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for sqlbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    struct FatalOnSeven;

    impl ErrorCategory for FatalOnSeven {
        fn name(&self) -> &'static str {
            "test"
        }

        fn message(&self, value: i32) -> String {
            format!("test code {value}")
        }

        fn is_fatal(&self, value: i32) -> bool {
            value == 7
        }
    }

    #[test]
    fn success_codes_compare_equal_across_categories() {
        let a = ErrorCode::success();
        let b = ErrorCode::new(0, &FatalOnSeven);
        assert_eq!(a, b);
        assert!(a.is_ok());
        assert!(!a.is_fatal());
    }

    #[test]
    fn codes_compare_by_value_and_category() {
        let a = ErrorCode::new(3, &FatalOnSeven);
        let b = ErrorCode::from(FrameworkErrc::RowWidth);
        assert_eq!(a.value(), b.value());
        assert_ne!(a, b);
        assert_eq!(b, FrameworkErrc::RowWidth);
    }

    #[test]
    fn fatal_codes_never_become_driver_errors() {
        let err = Error::from_code("execute()", ErrorCode::new(7, &FatalOnSeven), "oom");
        assert!(err.is_fatal());
        assert_eq!(err.code().value(), 7);
        assert_eq!(err.operation(), Some("execute()"));

        let err = Error::from_code("execute()", ErrorCode::new(1, &FatalOnSeven), "boom");
        assert!(matches!(err, Error::Driver(_)));
        assert_eq!(err.to_string(), "execute(): boom");
    }

    #[test]
    fn invalid_access_message_names_both_types() {
        let err = Error::InvalidAccess(InvalidAccess {
            expected: "INTEGER",
            actual: "TEXT",
        });
        assert_eq!(
            err.to_string(),
            "Cannot get a INTEGER value from a non-INTEGER value object (Type is TEXT)"
        );
        assert_eq!(err.code(), FrameworkErrc::InvalidAccess);
    }

    #[test]
    fn result_round_trip() {
        let code = ErrorCode::from(FrameworkErrc::ShutDown);
        assert_eq!(ErrorCode::from_result(&Err(code)), code);
        assert!(ErrorCode::from_result(&Ok(())).is_ok());
        assert!(ErrorCode::success().into_result().is_ok());
        assert_eq!(code.into_result(), Err(code));
    }
}
