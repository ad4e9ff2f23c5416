use crate::{
    error::{Error, Result},
    sql::{
        executor::{Plan, ResultSet, Rows},
        schema::Table,
        statement::Statement,
        types::{Row, Value},
    },
};

mod kv;

pub use kv::{KVEngine, KVTransaction};

/// Relational engine: hands out transactions
pub trait Engine: Clone {
    type Transaction: Transaction;

    fn begin(&self) -> Result<Self::Transaction>;

    /// Runs `f` in a fresh transaction, committing on success and rolling
    /// back on any error, a failed commit included.
    fn transact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self::Transaction) -> Result<T>,
    {
        let mut txn = self.begin()?;
        match f(&mut txn).and_then(|value| txn.commit().map(|()| value)) {
            Ok(value) => Ok(value),
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    tracing::error!(error = %rollback_err, cause = %err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Relational transaction.
///
/// The required methods are row-level primitives; statements are executed on
/// top of them by the provided [`execute`](Transaction::execute) and
/// [`query`](Transaction::query).
pub trait Transaction {
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// Inserts a row, failing if its primary key is taken
    fn create_row(&mut self, table: &Table, row: Row) -> Result<()>;
    /// Replaces the row stored under primary key `key`
    fn update_row(&mut self, table: &Table, key: &[Value], row: Row) -> Result<()>;
    fn delete_row(&mut self, table: &Table, key: &[Value]) -> Result<()>;
    fn read_row(&self, table: &Table, key: &[Value]) -> Result<Option<Row>>;
    /// Claims the row under `key` so concurrent writers of it conflict.
    /// Returns whether the row exists.
    fn claim_row(&mut self, table: &Table, key: &[Value]) -> Result<bool>;
    /// All visible rows of a table, in primary key order
    fn scan_table(&self, table: &Table) -> Result<Vec<Row>>;

    fn create_table(&mut self, table: Table) -> Result<()>;
    fn get_table(&self, table_name: &str) -> Result<Option<Table>>;

    /// Allocates the next id of a table's sequence
    fn next_sequence(&mut self, table_name: &str) -> Result<i64>;
    /// Moves a table's sequence past `id` if it is not already
    fn advance_sequence(&mut self, table_name: &str, id: i64) -> Result<()>;

    fn must_get_table(&self, table_name: &str) -> Result<Table> {
        self.get_table(table_name)?
            .ok_or(Error::Internal(format!("table {} does not exist", table_name)))
    }

    /// Executes a statement, returning the number of rows it affected
    /// (or returned, for a select).
    fn execute(&mut self, stmt: impl Into<Statement>, params: &[Value]) -> Result<usize>
    where
        Self: Sized,
    {
        match Plan::build(self, stmt.into(), params)?.execute(self)? {
            ResultSet::Insert { count }
            | ResultSet::Update { count }
            | ResultSet::Delete { count } => Ok(count),
            ResultSet::Scan(rows) => Ok(rows.len()),
        }
    }

    /// Runs a select statement, returning its rows
    fn query(&mut self, stmt: impl Into<Statement>, params: &[Value]) -> Result<Rows>
    where
        Self: Sized,
    {
        match Plan::build(self, stmt.into(), params)?.execute(self)? {
            ResultSet::Scan(rows) => Ok(rows),
            other => Err(Error::Internal(format!(
                "statement returned {:?} instead of rows",
                other
            ))),
        }
    }
}
