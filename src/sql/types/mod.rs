use std::{cmp::Ordering, fmt::Display};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    String,
    Date,
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Integer => "INTEGER",
            DataType::String => "STRING",
            DataType::Date => "DATE",
        };
        f.write_str(name)
    }
}

/// A single cell value, also used for bound statement parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    String(String),
    Date(NaiveDate),
}

impl Value {
    /// Returns the data type of the value, or None if it's Null
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Integer(_) => Some(DataType::Integer),
            Self::String(_) => Some(DataType::String),
            Self::Date(_) => Some(DataType::Date),
        }
    }

    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Self::Integer(i) => Ok(*i),
            other => Err(Error::Internal(format!("expected integer, found {:?}", other))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(Error::Internal(format!("expected string, found {:?}", other))),
        }
    }

    pub fn as_date(&self) -> Result<NaiveDate> {
        match self {
            Self::Date(d) => Ok(*d),
            other => Err(Error::Internal(format!("expected date, found {:?}", other))),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

/// NULL sorts first; values of different types are incomparable
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            (_, _) => None,
        }
    }
}

/// A row is a vector of values in table column order
pub type Row = Vec<Value>;

/// Returns the value at `index`, failing on short rows
pub fn cell(row: &Row, index: usize) -> Result<&Value> {
    row.get(index).ok_or_else(|| {
        Error::Internal(format!("row has {} columns, wanted column {}", row.len(), index))
    })
}
