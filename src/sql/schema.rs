use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{error::{Error, Result}, sql::types::{DataType, Row, Value}};

/// Table schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: Vec::new() }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Validates table schema
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Internal(format!("table {} has no columns", self.name)));
        }

        if !self.columns.iter().any(|c| c.primary_key) {
            return Err(Error::Internal(format!("no primary key for table {}", self.name)));
        }

        let mut seen = HashSet::new();
        for column in self.columns.iter() {
            if !seen.insert(column.name.as_str()) {
                return Err(Error::Internal(format!(
                    "duplicate column {} in table {}",
                    column.name, self.name
                )));
            }
            if column.primary_key && column.nullable {
                return Err(Error::Internal(format!(
                    "primary key column {} cannot be nullable",
                    column.name
                )));
            }
            if let Some(default) = &column.default {
                column.check_value(default)?;
            }
        }

        Ok(())
    }

    /// Extracts the primary key values from a row, in column order
    pub fn primary_key(&self, row: &Row) -> Result<Vec<Value>> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| {
                row.get(i).cloned().ok_or_else(|| {
                    Error::Internal(format!("row too short for table {}", self.name))
                })
            })
            .collect()
    }

    /// The integer column backing the id sequence, if the primary key is a
    /// single integer column
    pub fn sequence_column(&self) -> Option<usize> {
        let mut keys = self.columns.iter().enumerate().filter(|(_, c)| c.primary_key);
        match (keys.next(), keys.next()) {
            (Some((i, c)), None) if c.datatype == DataType::Integer => Some(i),
            _ => None,
        }
    }

    /// Returns the column index for a given column name
    pub fn col_index(&self, col_name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == col_name)
            .ok_or(Error::Internal(format!(
                "column {} not found in table {}",
                col_name, self.name
            )))
    }

    /// Checks arity, nullability and types of a full row
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Validation(format!(
                "table {} has {} columns, row has {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        for (column, value) in self.columns.iter().zip(row.iter()) {
            column.check_value(value)?;
        }
        Ok(())
    }
}

/// Column schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            nullable: false,
            default: None,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default.get_or_insert(Value::Null);
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn check_value(&self, value: &Value) -> Result<()> {
        match value.datatype() {
            None if self.nullable => Ok(()),
            None => Err(Error::Validation(format!("column {} cannot be null", self.name))),
            Some(dt) if dt != self.datatype => Err(Error::Validation(format!(
                "column {} expects {}, got {}",
                self.name, self.datatype, dt
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, Table};
    use crate::{error::{Error, Result}, sql::types::{DataType, Value}};

    fn searches() -> Table {
        Table::new("searches")
            .column(Column::new("pid", DataType::Integer).primary_key())
            .column(Column::new("aid", DataType::Integer).primary_key())
            .column(Column::new("note", DataType::String).nullable())
    }

    #[test]
    fn test_composite_key() -> Result<()> {
        let table = searches();
        table.validate()?;
        let row = vec![Value::Integer(77), Value::Integer(550), Value::Null];
        table.check_row(&row)?;
        assert_eq!(
            table.primary_key(&row)?,
            vec![Value::Integer(77), Value::Integer(550)]
        );
        assert_eq!(table.sequence_column(), None);
        Ok(())
    }

    #[test]
    fn test_row_checks() -> Result<()> {
        let table = searches();
        assert!(matches!(
            table.check_row(&vec![Value::Null, Value::Integer(550), Value::Null]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            table.check_row(&vec![Value::from("77"), Value::Integer(550), Value::Null]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            table.check_row(&vec![Value::Integer(77)]),
            Err(Error::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_bad_schemas() {
        let no_key = Table::new("t").column(Column::new("a", DataType::Integer));
        assert!(no_key.validate().is_err());

        let duplicate = Table::new("t")
            .column(Column::new("a", DataType::Integer).primary_key())
            .column(Column::new("a", DataType::String));
        assert!(duplicate.validate().is_err());

        let bad_default = Table::new("t")
            .column(Column::new("a", DataType::Integer).primary_key())
            .column(Column::new("b", DataType::Integer).default("zero"));
        assert!(bad_default.validate().is_err());

        let sequenced = Table::new("t")
            .column(Column::new("name", DataType::String))
            .column(Column::new("id", DataType::Integer).primary_key());
        assert_eq!(sequenced.sequence_column(), Some(1));
    }
}
