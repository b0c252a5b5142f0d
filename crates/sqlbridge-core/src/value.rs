//! Dynamic database values.

use crate::Result;
use crate::adaptor::Adaptor;
use crate::error::{Error, InvalidAccess};
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

/// A dynamically-typed database cell.
///
/// Values of different tags compare by tag order alone (see
/// [`ValueType`]); values with the same tag compare by payload. Reals use
/// IEEE total ordering, so `NaN` equals itself and `Value` can be `Eq`,
/// `Ord` and `Hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// 64-bit signed integer
    Integer(i64),

    /// 64-bit floating point
    Real(f64),

    /// Text string
    Text(String),

    /// Binary data
    Blob(Vec<u8>),

    /// Point in time
    DateTime(SystemTime),
}

impl Value {
    /// Build a value from a basic scalar or any adapted type.
    ///
    /// Adapted types that report themselves null produce [`Value::Null`]
    /// without their base conversion running.
    pub fn new<T: IntoValue>(value: T) -> Self {
        value.into_value()
    }

    /// Decode this value as `T`.
    #[allow(clippy::result_large_err)]
    pub fn get<T: FromValue>(&self) -> Result<T> {
        T::from_value(self)
    }

    /// The active tag.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Integer(_) => ValueType::Integer,
            Value::Real(_) => ValueType::Real,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::DateTime(_) => ValueType::DateTime,
        }
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<SystemTime> {
        match self {
            Value::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    pub(crate) fn invalid_access(&self, expected: ValueType) -> Error {
        Error::InvalidAccess(InvalidAccess {
            expected: expected.name(),
            actual: self.type_name(),
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            _ => self.value_type().cmp(&other.value_type()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value_type().hash(state);
        match self {
            Value::Null => {}
            Value::Integer(v) => v.hash(state),
            Value::Real(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Blob(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
        }
    }
}

/// Decode a [`Value`] into a Rust type.
///
/// Implemented directly for the basic scalars (`i64`, `f64`, `String`,
/// `Vec<u8>`, `SystemTime`) and for every type with an [`Adaptor`].
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

/// Encode a Rust type as a [`Value`].
pub trait IntoValue {
    fn into_value(self) -> Value;
}

macro_rules! basic_scalar {
    ($ty:ty, $tag:ident, $bind:ident => $read:expr) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                match value {
                    Value::$tag($bind) => Ok($read),
                    other => Err(other.invalid_access(ValueType::$tag)),
                }
            }
        }

        impl IntoValue for $ty {
            fn into_value(self) -> Value {
                Value::$tag(self)
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$tag(v)
            }
        }
    };
}

basic_scalar!(i64, Integer, v => *v);
basic_scalar!(f64, Real, v => *v);
basic_scalar!(String, Text, v => v.clone());
basic_scalar!(Vec<u8>, Blob, v => v.clone());
basic_scalar!(SystemTime, DateTime, v => *v);

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for &[u8] {
    fn into_value(self) -> Value {
        Value::Blob(self.to_vec())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Adaptor> IntoValue for T {
    fn into_value(self) -> Value {
        if T::NULLABLE && self.is_null() {
            return Value::Null;
        }
        self.to_base().into_value()
    }
}

impl<T: Adaptor> FromValue for T {
    fn from_value(value: &Value) -> Result<Self> {
        if T::NULLABLE && value.is_null() {
            return T::null().ok_or_else(|| {
                Error::InvalidAccess(InvalidAccess {
                    expected: std::any::type_name::<T>(),
                    actual: value.type_name(),
                })
            });
        }
        let base = T::Base::from_value(value)?;
        T::from_base(base)
    }
}
