//! Database row representation and row conversion.

use crate::Result;
use crate::error::{Error, RowWidthError, TypeError};
use crate::value::{FromValue, Value};
use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;
use std::time::SystemTime;

/// Column names of a result set, with a name-to-position index.
///
/// A driver builds one per statement run and hands every row an `Arc` to it.
#[derive(Debug, Clone, Default)]
pub struct ColumnInfo {
    names: Vec<String>,
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Index `names` by position. A repeated name resolves to its last
    /// occurrence.
    pub fn new(names: Vec<String>) -> Self {
        let name_to_index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self {
            names,
            name_to_index,
        }
    }

    /// Placeholder names `col0..colN` for rows built without metadata.
    pub fn anonymous(width: usize) -> Self {
        Self::new((0..width).map(|i| format!("col{}", i)).collect())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// One fetched record: a fixed-width, ordered sequence of values.
///
/// Rows are immutable once built. Index access is O(1); name access goes
/// through the shared [`ColumnInfo`].
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// A standalone row that owns its column names.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// A row that shares `columns` with the rest of its result set.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Create a row whose columns are named `col0..colN`.
    pub fn from_values(values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::anonymous(values.len()));
        Self { values, columns }
    }

    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Decode column `index` as `T`.
    #[allow(clippy::result_large_err)]
    pub fn get_as<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.get(index).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column {index} in a row of width {}", self.len()),
            })
        })?;
        value.get()
    }

    /// Decode the column called `name` as `T`.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column named {name:?}"),
            })
        })?;
        value.get()
    }

    /// Decode the only column of a width-1 row.
    #[allow(clippy::result_large_err)]
    pub fn scalar<T: FromValue>(&self) -> Result<T> {
        self.check_width(1)?;
        self.values[0].get()
    }

    #[allow(clippy::result_large_err)]
    fn check_width(&self, expected: usize) -> Result<()> {
        if self.len() == expected {
            Ok(())
        } else {
            Err(Error::RowWidth(RowWidthError {
                expected,
                actual: self.len(),
            }))
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// `(name, value)` for every column, in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names().zip(self.values.iter())
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

/// Conversion from a whole [`Row`] into a target shape.
///
/// Tuples convert element-wise in field order and require the row width to
/// equal their arity. Scalars require a width-1 row. `Row` itself converts
/// by moving, without touching any value.
pub trait FromRow: Sized {
    #[allow(clippy::result_large_err)]
    fn from_row(row: Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self> {
        Ok(row)
    }
}

impl FromRow for Vec<Value> {
    fn from_row(row: Row) -> Result<Self> {
        Ok(row.into_values())
    }
}

macro_rules! scalar_from_row {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl FromRow for $ty {
                fn from_row(row: Row) -> Result<Self> {
                    row.scalar()
                }
            }
        )+
    };
}

scalar_from_row!(
    Value,
    i64,
    f64,
    String,
    Vec<u8>,
    SystemTime,
    bool,
    i8,
    i16,
    i32,
    u8,
    u16,
    u32,
    u64,
    f32,
    serde_json::Value,
);

impl<T: FromValue + crate::value::IntoValue> FromRow for Option<T> {
    fn from_row(row: Row) -> Result<Self> {
        row.scalar()
    }
}

macro_rules! tuple_from_row {
    ($len:literal => $($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: Row) -> Result<Self> {
                row.check_width($len)?;
                Ok(($(row.values[$idx].get::<$name>()?,)+))
            }
        }
    };
}

tuple_from_row!(1 => A: 0);
tuple_from_row!(2 => A: 0, B: 1);
tuple_from_row!(3 => A: 0, B: 1, C: 2);
tuple_from_row!(4 => A: 0, B: 1, C: 2, D: 3);
tuple_from_row!(5 => A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_from_row!(6 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
tuple_from_row!(7 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
tuple_from_row!(8 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
tuple_from_row!(9 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8);
tuple_from_row!(10 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9);
tuple_from_row!(11 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10);
tuple_from_row!(12 => A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10, L: 11);
