use std::cmp::Ordering;

use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{BoundPredicate, Executor, Node, ResultSet, Rows},
        schema::Table,
        statement::OrderDirection,
        types::Value,
    },
};

/// Table scan executor (SELECT)
pub struct Scan {
    table: Table,
    filter: Vec<BoundPredicate>,
    for_update: bool,
}

impl Scan {
    pub fn new(table: Table, filter: Vec<BoundPredicate>, for_update: bool) -> Self {
        Self { table, filter, for_update }
    }

    /// When every primary key column is pinned by an equality predicate the
    /// row can be read directly instead of scanning the table.
    fn point_key(&self) -> Option<Vec<Value>> {
        self.table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key)
            .map(|(i, _)| {
                self.filter.iter().find_map(|p| match p {
                    BoundPredicate::Eq(col, value) if *col == i => Some(value.clone()),
                    _ => None,
                })
            })
            .collect()
    }
}

impl Executor for Scan {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        let mut rows = match self.point_key() {
            Some(key) => txn.read_row(&self.table, &key)?.into_iter().collect(),
            None => txn.scan_table(&self.table)?,
        };
        rows.retain(|row| self.filter.iter().all(|p| p.matches(row)));

        if self.for_update {
            for row in rows.iter() {
                let key = self.table.primary_key(row)?;
                txn.claim_row(&self.table, &key)?;
            }
        }

        tracing::debug!(table = %self.table.name, rows = rows.len(), for_update = self.for_update, "scan");
        Ok(ResultSet::Scan(Rows {
            columns: self.table.columns.iter().map(|c| c.name.clone()).collect(),
            rows,
        }))
    }
}

/// ORDER BY executor - sorts rows by the given column positions
pub struct Order {
    source: Box<Node>,
    order_by: Vec<(usize, OrderDirection)>,
}

impl Order {
    pub fn new(source: Node, order_by: Vec<(usize, OrderDirection)>) -> Self {
        Self { source: Box::new(source), order_by }
    }
}

impl Executor for Order {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        match (*self.source).execute(txn)? {
            ResultSet::Scan(mut rows) => {
                // Compare column by column; incomparable values count as equal
                rows.rows.sort_by(|a, b| {
                    for (index, direction) in self.order_by.iter() {
                        match a[*index].partial_cmp(&b[*index]) {
                            Some(Ordering::Equal) | None => {}
                            Some(o) if *direction == OrderDirection::Asc => return o,
                            Some(o) => return o.reverse(),
                        }
                    }
                    Ordering::Equal
                });
                Ok(ResultSet::Scan(rows))
            }
            other => Err(Error::Internal(format!("cannot order {:?}", other))),
        }
    }
}
