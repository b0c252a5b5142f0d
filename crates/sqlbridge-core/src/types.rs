//! Value type tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The six storage kinds a [`Value`](crate::Value) can hold.
///
/// Declaration order is the cross-type ordering used when comparing values
/// with different tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Null,
    Integer,
    Real,
    Text,
    Blob,
    DateTime,
}

impl ValueType {
    /// All tags in ordering order.
    pub const ALL: [ValueType; 6] = [
        ValueType::Null,
        ValueType::Integer,
        ValueType::Real,
        ValueType::Text,
        ValueType::Blob,
        ValueType::DateTime,
    ];

    /// Display name of the tag.
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::Integer => "INTEGER",
            ValueType::Real => "REAL",
            ValueType::Text => "TEXT",
            ValueType::Blob => "BLOB",
            ValueType::DateTime => "DATETIME",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_ordered_by_declaration() {
        let mut sorted = ValueType::ALL;
        sorted.reverse();
        sorted.sort();
        assert_eq!(sorted, ValueType::ALL);
        assert!(ValueType::Null < ValueType::DateTime);
    }

    #[test]
    fn names() {
        assert_eq!(ValueType::Integer.to_string(), "INTEGER");
        assert_eq!(ValueType::DateTime.name(), "DATETIME");
    }
}
