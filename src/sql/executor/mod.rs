use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::{
            mutation::{Delete, Insert, Update},
            query::{Order, Scan},
        },
        schema::Table,
        statement::{self, Assignment, OrderDirection, Predicate, Statement},
        types::{Row, Value},
    },
};

mod mutation;
mod query;

/// A plan node that runs against a transaction
pub trait Executor {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet>;
}

/// Execution result set
#[derive(Debug, PartialEq)]
pub enum ResultSet {
    Insert { count: usize },
    Scan(Rows),
    Update { count: usize },
    Delete { count: usize },
}

/// Rows returned by a select, with the table's column names
#[derive(Debug, Clone, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Plan tree with every parameter bound and every column resolved
pub enum Node {
    Insert(Insert),
    Scan(Scan),
    Order(Order),
    Update(Update),
    Delete(Delete),
}

impl Executor for Node {
    fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        match self {
            Node::Insert(exec) => exec.execute(txn),
            Node::Scan(exec) => exec.execute(txn),
            Node::Order(exec) => exec.execute(txn),
            Node::Update(exec) => exec.execute(txn),
            Node::Delete(exec) => exec.execute(txn),
        }
    }
}

pub struct Plan(Node);

impl Plan {
    /// Binds `params` into `stmt` against the current table schemas
    pub fn build<T: Transaction>(txn: &T, stmt: Statement, params: &[Value]) -> Result<Self> {
        let node = match stmt {
            Statement::Insert(statement::Insert { table }) => {
                let table = txn.must_get_table(&table)?;
                let row = pad_row(&table, params)?;
                Node::Insert(Insert::new(table, row))
            }
            Statement::Select(select) => {
                let table = txn.must_get_table(&select.table)?;
                let mut params = Params::new(params, select.filter.iter().map(Predicate::arity).sum())?;
                let filter = bind_filter(&table, &select.filter, &mut params)?;
                let order_by = select
                    .order_by
                    .iter()
                    .map(|(column, direction)| Ok((table.col_index(column)?, *direction)))
                    .collect::<Result<Vec<(usize, OrderDirection)>>>()?;

                let scan = Node::Scan(Scan::new(table, filter, select.for_update));
                if order_by.is_empty() {
                    scan
                } else {
                    Node::Order(Order::new(scan, order_by))
                }
            }
            Statement::Update(update) => {
                let table = txn.must_get_table(&update.table)?;
                let arity = update.assignments.len()
                    + update.filter.iter().map(Predicate::arity).sum::<usize>();
                let mut params = Params::new(params, arity)?;
                let assignments = update
                    .assignments
                    .iter()
                    .map(|assignment| bind_assignment(&table, assignment, &mut params))
                    .collect::<Result<Vec<_>>>()?;
                let filter = bind_filter(&table, &update.filter, &mut params)?;
                let source = Node::Scan(Scan::new(table.clone(), filter, false));
                Node::Update(Update::new(table, source, assignments))
            }
            Statement::Delete(delete) => {
                let table = txn.must_get_table(&delete.table)?;
                let mut params = Params::new(params, delete.filter.iter().map(Predicate::arity).sum())?;
                let filter = bind_filter(&table, &delete.filter, &mut params)?;
                let source = Node::Scan(Scan::new(table.clone(), filter, false));
                Node::Delete(Delete::new(table, source))
            }
        };
        Ok(Plan(node))
    }

    pub fn execute<T: Transaction>(self, txn: &mut T) -> Result<ResultSet> {
        self.0.execute(txn)
    }
}

/// A predicate with its column resolved and its operands bound
#[derive(Debug, Clone, PartialEq)]
pub enum BoundPredicate {
    Eq(usize, Value),
    Lt(usize, Value),
    Between(usize, Value, Value),
}

impl BoundPredicate {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            BoundPredicate::Eq(i, v) => row.get(*i).is_some_and(|c| c == v),
            BoundPredicate::Lt(i, v) => row.get(*i).is_some_and(|c| !matches!(c, Value::Null) && c < v),
            BoundPredicate::Between(i, lo, hi) => row
                .get(*i)
                .is_some_and(|c| !matches!(c, Value::Null) && lo <= c && c <= hi),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoundAssignment {
    Set(usize, Value),
    Increment(usize, i64),
}

/// Positional parameters, consumed front to back
struct Params<'a> {
    values: std::slice::Iter<'a, Value>,
}

impl<'a> Params<'a> {
    fn new(values: &'a [Value], expected: usize) -> Result<Self> {
        if values.len() != expected {
            return Err(Error::Validation(format!(
                "statement expects {} parameters, got {}",
                expected,
                values.len()
            )));
        }
        Ok(Self { values: values.iter() })
    }

    /// Next parameter, which must be a non-null value of the column's type
    fn take_for(&mut self, table: &Table, column: usize) -> Result<Value> {
        let value = self
            .values
            .next()
            .cloned()
            .ok_or_else(|| Error::Internal("ran out of parameters".into()))?;
        let col = &table.columns[column];
        match value.datatype() {
            Some(dt) if dt == col.datatype => Ok(value),
            Some(dt) => Err(Error::Validation(format!(
                "parameter for column {} must be {}, got {}",
                col.name, col.datatype, dt
            ))),
            None => Err(Error::Validation(format!(
                "parameter for column {} cannot be null",
                col.name
            ))),
        }
    }
}

fn bind_filter(table: &Table, filter: &[Predicate], params: &mut Params) -> Result<Vec<BoundPredicate>> {
    filter
        .iter()
        .map(|predicate| {
            let column = table.col_index(predicate.column())?;
            Ok(match predicate {
                Predicate::Eq(_) => BoundPredicate::Eq(column, params.take_for(table, column)?),
                Predicate::Lt(_) => BoundPredicate::Lt(column, params.take_for(table, column)?),
                Predicate::Between(_) => BoundPredicate::Between(
                    column,
                    params.take_for(table, column)?,
                    params.take_for(table, column)?,
                ),
            })
        })
        .collect()
}

fn bind_assignment(table: &Table, assignment: &Assignment, params: &mut Params) -> Result<BoundAssignment> {
    match assignment {
        Assignment::Set(name) => {
            let column = table.col_index(name)?;
            // nulls are allowed here, the row check enforces nullability
            let value = params
                .values
                .next()
                .cloned()
                .ok_or_else(|| Error::Internal("ran out of parameters".into()))?;
            Ok(BoundAssignment::Set(column, value))
        }
        Assignment::Increment(name) => {
            let column = table.col_index(name)?;
            let delta = params.take_for(table, column)?.as_integer().map_err(|_| {
                Error::Validation(format!("cannot increment non-integer column {}", name))
            })?;
            Ok(BoundAssignment::Increment(column, delta))
        }
    }
}

/// Builds a full row from insert parameters; missing trailing columns take
/// their defaults.
fn pad_row(table: &Table, params: &[Value]) -> Result<Row> {
    if params.len() > table.columns.len() {
        return Err(Error::Validation(format!(
            "table {} has {} columns, got {} values",
            table.name,
            table.columns.len(),
            params.len()
        )));
    }
    let mut row = params.to_vec();
    for column in table.columns.iter().skip(params.len()) {
        match &column.default {
            Some(default) => row.push(default.clone()),
            None => {
                return Err(Error::Validation(format!(
                    "no value given for column {}",
                    column.name
                )))
            }
        }
    }
    Ok(row)
}
