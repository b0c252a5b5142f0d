//! Conversions between foreign types and [`Value`](crate::Value).
//!
//! An [`Adaptor`] maps a type onto a base type that `Value` already
//! understands (a basic scalar, or another adapted type). Implementing it is
//! all that is needed for a type to work with `Value::new`, `Value::get`,
//! row access and statement binding.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::{FromValue, IntoValue};

/// Conversion between `Self` and a `Value`-representable base type.
///
/// For a nullable adaptor, `to_base` is never called on a value for which
/// `is_null` returns true: such values become `Value::Null` directly, and
/// decoding `Value::Null` yields `null()` without touching the base type.
pub trait Adaptor: Sized {
    /// The type this one is stored as.
    type Base: FromValue + IntoValue;

    /// Whether `Self` has a null state.
    const NULLABLE: bool = false;

    fn to_base(self) -> Self::Base;

    #[allow(clippy::result_large_err)]
    fn from_base(base: Self::Base) -> Result<Self>;

    fn is_null(&self) -> bool {
        false
    }

    /// The value decoded from `Value::Null`, if `Self` has one.
    fn null() -> Option<Self> {
        None
    }
}

fn not_representable<T>(actual: impl ToString) -> Error {
    Error::Type(TypeError {
        expected: std::any::type_name::<T>(),
        actual: actual.to_string(),
    })
}

macro_rules! narrow_integer {
    ($($ty:ty),+) => {
        $(
            impl Adaptor for $ty {
                type Base = i64;

                fn to_base(self) -> i64 {
                    i64::from(self)
                }

                fn from_base(base: i64) -> Result<Self> {
                    <$ty>::try_from(base).map_err(|_| not_representable::<$ty>(base))
                }
            }
        )+
    };
}

narrow_integer!(i8, i16, i32, u8, u16, u32);

/// Stored bit-for-bit in an `i64`; values above `i64::MAX` read back as
/// negative integers at the database level.
impl Adaptor for u64 {
    type Base = i64;

    fn to_base(self) -> i64 {
        self as i64
    }

    fn from_base(base: i64) -> Result<Self> {
        Ok(base as u64)
    }
}

impl Adaptor for bool {
    type Base = i64;

    fn to_base(self) -> i64 {
        i64::from(self)
    }

    fn from_base(base: i64) -> Result<Self> {
        Ok(base != 0)
    }
}

impl Adaptor for f32 {
    type Base = f64;

    fn to_base(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_base(base: f64) -> Result<Self> {
        Ok(base as f32)
    }
}

/// JSON documents are stored as text.
impl Adaptor for serde_json::Value {
    type Base = String;

    fn to_base(self) -> String {
        self.to_string()
    }

    fn from_base(base: String) -> Result<Self> {
        serde_json::from_str(&base).map_err(|e| not_representable::<serde_json::Value>(e))
    }
}

impl<T: FromValue + IntoValue> Adaptor for Option<T> {
    type Base = T;

    const NULLABLE: bool = true;

    fn to_base(self) -> T {
        match self {
            Some(v) => v,
            None => unreachable!("to_base is never called for a null value"),
        }
    }

    fn from_base(base: T) -> Result<Self> {
        Ok(Some(base))
    }

    fn is_null(&self) -> bool {
        self.is_none()
    }

    fn null() -> Option<Self> {
        Some(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TO_BASE_CALLS: AtomicUsize = AtomicUsize::new(0);

    /// Nullable adaptor that counts base conversions.
    #[derive(Debug, Clone, PartialEq)]
    enum Reading {
        Missing,
        Celsius(i64),
    }

    impl Adaptor for Reading {
        type Base = i64;
        const NULLABLE: bool = true;

        fn to_base(self) -> i64 {
            TO_BASE_CALLS.fetch_add(1, Ordering::SeqCst);
            match self {
                Reading::Celsius(c) => c,
                Reading::Missing => panic!("to_base called on a null reading"),
            }
        }

        fn from_base(base: i64) -> Result<Self> {
            Ok(Reading::Celsius(base))
        }

        fn is_null(&self) -> bool {
            matches!(self, Reading::Missing)
        }

        fn null() -> Option<Self> {
            Some(Reading::Missing)
        }
    }

    /// Adaptor layered on another adaptor.
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Port(u16);

    impl Adaptor for Port {
        type Base = u16;

        fn to_base(self) -> u16 {
            self.0
        }

        fn from_base(base: u16) -> Result<Self> {
            Ok(Port(base))
        }
    }

    #[test]
    fn test_null_adaptor_bypasses_base_conversion() {
        let before = TO_BASE_CALLS.load(Ordering::SeqCst);
        let value = Value::new(Reading::Missing);
        assert!(value.is_null());
        assert_eq!(TO_BASE_CALLS.load(Ordering::SeqCst), before);
        assert_eq!(value.get::<Reading>().unwrap(), Reading::Missing);

        let value = Value::new(Reading::Celsius(21));
        assert_eq!(value, Value::Integer(21));
        assert_eq!(value.get::<Reading>().unwrap(), Reading::Celsius(21));
    }

    #[test]
    fn test_round_trips() {
        assert!(Value::new(true).get::<bool>().unwrap());
        assert_eq!(Value::new(-5_i8).get::<i8>().unwrap(), -5);
        assert_eq!(Value::new(40_000_u16).get::<u16>().unwrap(), 40_000);
        assert_eq!(Value::new(u64::MAX).get::<u64>().unwrap(), u64::MAX);
        assert_eq!(Value::new(0.25_f32).get::<f32>().unwrap(), 0.25);
        assert_eq!(Value::new(Port(8080)).get::<Port>().unwrap(), Port(8080));
        assert_eq!(Value::new(Some(3_i32)).get::<Option<i32>>().unwrap(), Some(3));
        assert_eq!(Value::new(None::<String>).get::<Option<String>>().unwrap(), None);

        let doc = serde_json::json!({"k": [1, 2]});
        assert_eq!(Value::new(doc.clone()).get::<serde_json::Value>().unwrap(), doc);
    }

    #[test]
    fn test_narrowing_out_of_range_is_type_error() {
        let err = Value::Integer(300).get::<u8>().unwrap_err();
        assert!(matches!(err, Error::Type(_)), "got {err:?}");
    }

    #[test]
    fn test_non_nullable_adaptor_rejects_null() {
        let err = Value::Null.get::<i32>().unwrap_err();
        assert!(matches!(err, Error::InvalidAccess(_)), "got {err:?}");
    }
}
