use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{BoundAssignment, Executor, Node, ResultSet},
        schema::Table,
        types::{Row, Value},
    },
};

/// INSERT executor
pub struct Insert {
    table: Table,
    row: Row,
}

impl Insert {
    pub fn new(table: Table, row: Row) -> Self {
        Self { table, row }
    }
}

impl Executor for Insert {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        self.table.check_row(&self.row)?;
        if let Some(index) = self.table.sequence_column() {
            txn.advance_sequence(&self.table.name, self.row[index].as_integer()?)?;
        }
        tracing::debug!(table = %self.table.name, row = ?self.row, "insert");
        txn.create_row(&self.table, self.row)?;
        Ok(ResultSet::Insert { count: 1 })
    }
}

/// UPDATE executor, rewrites every row its source returns
pub struct Update {
    table: Table,
    source: Box<Node>,
    assignments: Vec<BoundAssignment>,
}

impl Update {
    pub fn new(table: Table, source: Node, assignments: Vec<BoundAssignment>) -> Self {
        Self { table, source: Box::new(source), assignments }
    }
}

fn apply(table: &Table, assignments: &[BoundAssignment], row: &Row) -> Result<Row> {
    let mut updated = row.clone();
    for assignment in assignments.iter() {
        match assignment {
            BoundAssignment::Set(index, value) => updated[*index] = value.clone(),
            BoundAssignment::Increment(index, delta) => {
                let column = &table.columns[*index].name;
                let current = match &updated[*index] {
                    Value::Integer(i) => *i,
                    other => {
                        return Err(Error::Validation(format!(
                            "cannot increment {} value {:?}",
                            column, other
                        )))
                    }
                };
                let next = current.checked_add(*delta).ok_or_else(|| {
                    Error::Validation(format!("increment of {} overflows", column))
                })?;
                updated[*index] = Value::Integer(next);
            }
        }
    }
    Ok(updated)
}

impl Executor for Update {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        let Update { table, source, assignments } = self;
        let rows = match (*source).execute(txn)? {
            ResultSet::Scan(rows) => rows,
            other => return Err(Error::Internal(format!("cannot update from {:?}", other))),
        };

        let mut count = 0;
        for row in rows.iter() {
            let key = table.primary_key(row)?;
            let updated = apply(&table, &assignments, row)?;
            if table.primary_key(&updated)? != key {
                return Err(Error::Validation(format!(
                    "cannot change the primary key of {}",
                    table.name
                )));
            }
            table.check_row(&updated)?;
            txn.update_row(&table, &key, updated)?;
            count += 1;
        }
        tracing::debug!(table = %table.name, count, "update");
        Ok(ResultSet::Update { count })
    }
}

/// DELETE executor
pub struct Delete {
    table: Table,
    source: Box<Node>,
}

impl Delete {
    pub fn new(table: Table, source: Node) -> Self {
        Self { table, source: Box::new(source) }
    }
}

impl Executor for Delete {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        let rows = match (*self.source).execute(txn)? {
            ResultSet::Scan(rows) => rows,
            other => return Err(Error::Internal(format!("cannot delete from {:?}", other))),
        };

        let mut count = 0;
        for row in rows.iter() {
            txn.delete_row(&self.table, &self.table.primary_key(row)?)?;
            count += 1;
        }
        tracing::debug!(table = %self.table.name, count, "delete");
        Ok(ResultSet::Delete { count })
    }
}
