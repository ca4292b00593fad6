//! Rows, column values and selection filters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a physical row within one table.
///
/// Row ids are assigned by the store on insert and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl RowId {
    /// Creates a row id from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row:{}", self.0)
    }
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// Absent value (nullable columns).
    Null,
    /// Boolean value.
    Bool(bool),
    /// Unsigned integer value.
    U64(u64),
    /// Signed integer value.
    I64(i64),
    /// UTF-8 string value.
    Str(String),
    /// Opaque byte value.
    Bytes(Vec<u8>),
}

impl Value {
    /// Returns the value as `u64` if it is one.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `&str` if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as bytes if it is one.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the value as `bool` if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if the value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// One stored row: an ordered column-name to value map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row(pub BTreeMap<String, Value>);

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets a column, replacing any previous value. Builder style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.0.insert(column.into(), value);
        self
    }

    /// Sets a column in place.
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.0.insert(column.into(), value);
    }

    /// Returns a column value, `Value::Null` for absent columns.
    #[must_use]
    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&Value::Null)
    }

    /// Returns a `u64` column.
    #[must_use]
    pub fn u64(&self, column: &str) -> Option<u64> {
        self.get(column).as_u64()
    }

    /// Returns a string column.
    #[must_use]
    pub fn str(&self, column: &str) -> Option<&str> {
        self.get(column).as_str()
    }

    /// Returns a bytes column.
    #[must_use]
    pub fn bytes(&self, column: &str) -> Option<&[u8]> {
        self.get(column).as_bytes()
    }

    /// Returns a bool column.
    #[must_use]
    pub fn bool(&self, column: &str) -> Option<bool> {
        self.get(column).as_bool()
    }
}

/// A predicate over one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Column equals the value.
    Eq(Value),
    /// Column is less than or equal to the value.
    Le(Value),
    /// Column is strictly greater than the value.
    Gt(Value),
    /// Column is `Null` or absent.
    IsNull,
    /// Column is present and not `Null`.
    NotNull,
}

impl Predicate {
    fn matches(&self, actual: &Value) -> bool {
        match self {
            Predicate::Eq(v) => actual == v,
            Predicate::Le(v) => !actual.is_null() && actual <= v,
            Predicate::Gt(v) => !actual.is_null() && actual > v,
            Predicate::IsNull => actual.is_null(),
            Predicate::NotNull => !actual.is_null(),
        }
    }
}

/// A conjunction of column predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter(Vec<(String, Predicate)>);

impl Filter {
    /// Creates an empty filter matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self(Vec::new())
    }

    /// Adds a predicate on a column. Builder style.
    #[must_use]
    pub fn and(mut self, column: impl Into<String>, predicate: Predicate) -> Self {
        self.0.push((column.into(), predicate));
        self
    }

    /// Shorthand for an equality predicate.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::all().and(column, Predicate::Eq(value))
    }

    /// Returns true if the row satisfies every predicate.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.0.iter().all(|(col, pred)| pred.matches(row.get(col)))
    }
}
