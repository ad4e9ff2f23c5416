use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::{
        schema::Table,
        types::{Row, Value},
    },
    storage::{
        self,
        engine::{Engine as StorageEngine, Status},
        keycode::serialize_key,
    },
};

use super::{Engine, Transaction};

/// Relational engine backed by an MVCC key/value store
pub struct KVEngine<E: StorageEngine> {
    pub kv: storage::mvcc::Mvcc<E>,
}

impl<E: StorageEngine> Clone for KVEngine<E> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<E: StorageEngine> KVEngine<E> {
    /// Wraps a storage engine, rolling back transactions a previous process
    /// left unfinished.
    pub fn new(engine: E) -> Result<Self> {
        let kv = storage::mvcc::Mvcc::new(engine);
        let recovered = kv.recover()?;
        if recovered > 0 {
            tracing::info!(recovered, "recovered storage after an unclean shutdown");
        }
        Ok(Self { kv })
    }

    pub fn status(&self) -> Result<Status> {
        self.kv.status()
    }
}

impl<E: StorageEngine> Engine for KVEngine<E> {
    type Transaction = KVTransaction<E>;

    fn begin(&self) -> Result<Self::Transaction> {
        Ok(Self::Transaction::new(self.kv.begin()?))
    }
}

/// Relational transaction over one MVCC transaction
pub struct KVTransaction<E: StorageEngine> {
    txn: storage::mvcc::MvccTransaction<E>,
}

impl<E: StorageEngine> KVTransaction<E> {
    pub fn new(txn: storage::mvcc::MvccTransaction<E>) -> Self {
        Self { txn }
    }

    fn row_key(table: &Table, key: &[Value]) -> Result<Vec<u8>> {
        serialize_key(&Key::Row(table.name.clone(), key.to_vec()))
    }
}

impl<E: StorageEngine> Transaction for KVTransaction<E> {
    fn commit(&self) -> Result<()> {
        self.txn.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.txn.rollback()
    }

    fn create_row(&mut self, table: &Table, row: Row) -> Result<()> {
        let key = table.primary_key(&row)?;
        let id = Self::row_key(table, &key)?;
        if self.txn.get(id.clone())?.is_some() {
            return Err(Error::Validation(format!(
                "duplicate primary key {:?} in table {}",
                key, table.name
            )));
        }
        self.txn.set(id, bincode::serialize(&row)?)
    }

    fn update_row(&mut self, table: &Table, key: &[Value], row: Row) -> Result<()> {
        let id = Self::row_key(table, key)?;
        self.txn.set(id, bincode::serialize(&row)?)
    }

    fn delete_row(&mut self, table: &Table, key: &[Value]) -> Result<()> {
        self.txn.delete(Self::row_key(table, key)?)
    }

    fn read_row(&self, table: &Table, key: &[Value]) -> Result<Option<Row>> {
        Ok(self
            .txn
            .get(Self::row_key(table, key)?)?
            .map(|v| bincode::deserialize(&v))
            .transpose()?)
    }

    fn claim_row(&mut self, table: &Table, key: &[Value]) -> Result<bool> {
        self.txn.claim(Self::row_key(table, key)?)
    }

    fn scan_table(&self, table: &Table) -> Result<Vec<Row>> {
        let prefix = serialize_key(&KeyPrefix::Row(table.name.clone()))?;
        self.txn
            .scan_prefix(prefix)?
            .into_iter()
            .map(|result| Ok(bincode::deserialize(&result.value)?))
            .collect()
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        if self.get_table(&table.name)?.is_some() {
            return Err(Error::Internal(format!("table {} already exists", table.name)));
        }
        table.validate()?;

        let key = serialize_key(&Key::Table(table.name.clone()))?;
        self.txn.set(key, bincode::serialize(&table)?)
    }

    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        let key = serialize_key(&Key::Table(table_name.to_string()))?;
        Ok(self
            .txn
            .get(key)?
            .map(|v| bincode::deserialize(&v))
            .transpose()?)
    }

    fn next_sequence(&mut self, table_name: &str) -> Result<i64> {
        let key = serialize_key(&Key::Sequence(table_name.to_string()))?;
        let last: i64 = match self.txn.get(key.clone())? {
            Some(v) => bincode::deserialize(&v)?,
            None => 0,
        };
        let next = last + 1;
        self.txn.set(key, bincode::serialize(&next)?)?;
        Ok(next)
    }

    fn advance_sequence(&mut self, table_name: &str, id: i64) -> Result<()> {
        let key = serialize_key(&Key::Sequence(table_name.to_string()))?;
        let last: i64 = match self.txn.get(key.clone())? {
            Some(v) => bincode::deserialize(&v)?,
            None => 0,
        };
        if id > last {
            self.txn.set(key, bincode::serialize(&id)?)?;
        }
        Ok(())
    }
}

/// Key layout of the relational data inside the MVCC store
#[derive(Debug, Serialize, Deserialize)]
enum Key {
    Table(String),
    /// Table name and primary key values
    Row(String, Vec<Value>),
    /// Last id handed out for a table
    Sequence(String),
}

/// Key prefixes for scans; variant order matches [`Key`]
#[derive(Debug, Serialize, Deserialize)]
enum KeyPrefix {
    Table,
    Row(String),
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::KVEngine;
    use crate::{
        error::{Error, Result},
        sql::{
            engine::{Engine, Transaction},
            schema::{Column, Table},
            statement::{Delete, Insert, OrderDirection, Select, Update},
            types::{DataType, Value},
        },
        storage::memory::MemoryEngine,
    };

    fn slots() -> Table {
        Table::new("slot")
            .column(Column::new("id", DataType::Integer).primary_key())
            .column(Column::new("day", DataType::Date))
            .column(Column::new("status", DataType::String).default("AV"))
            .column(Column::new("bookings", DataType::Integer).default(0i64))
    }

    fn day(d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(2026, 11, d).expect("valid date"))
    }

    fn seeded() -> Result<KVEngine<MemoryEngine>> {
        let engine = KVEngine::new(MemoryEngine::new())?;
        engine.transact(|txn| {
            txn.create_table(slots())?;
            txn.execute(Insert::new("slot"), &[Value::Integer(550), day(3)])?;
            txn.execute(Insert::new("slot"), &[Value::Integer(551), day(4), "AC".into()])?;
            txn.execute(Insert::new("slot"), &[Value::Integer(12), day(5), "WL".into(), Value::Integer(2)])?;
            Ok(())
        })?;
        Ok(engine)
    }

    #[test]
    fn test_insert_and_select() -> Result<()> {
        let engine = seeded()?;
        let mut txn = engine.begin()?;

        let rows = txn.query(Select::new("slot"), &[])?;
        assert_eq!(rows.columns, vec!["id", "day", "status", "bookings"]);
        // primary key order, negative-safe integer encoding
        let ids = rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![Value::Integer(12), Value::Integer(550), Value::Integer(551)]);

        let rows = txn.query(Select::new("slot").where_eq("id"), &[Value::Integer(550)])?;
        assert_eq!(
            rows.first(),
            Some(&vec![Value::Integer(550), day(3), "AV".into(), Value::Integer(0)])
        );
        Ok(())
    }

    #[test]
    fn test_filters_and_order() -> Result<()> {
        let engine = seeded()?;
        let mut txn = engine.begin()?;

        let rows = txn.query(
            Select::new("slot")
                .where_between("day")
                .order_by("day", OrderDirection::Desc),
            &[day(3), day(4)],
        )?;
        let ids = rows.iter().map(|r| r[0].clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![Value::Integer(551), Value::Integer(550)]);

        let count = txn.execute(Select::new("slot").where_lt("day"), &[day(5)])?;
        assert_eq!(count, 2);

        let count = txn.execute(
            Select::new("slot").where_eq("status").where_eq("bookings"),
            &["WL".into(), Value::Integer(2)],
        )?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[test]
    fn test_update_and_delete() -> Result<()> {
        let engine = seeded()?;
        engine.transact(|txn| {
            let count = txn.execute(
                Update::new("slot").set("status").increment("bookings").where_eq("id"),
                &["WL".into(), Value::Integer(1), Value::Integer(551)],
            )?;
            assert_eq!(count, 1);
            let count = txn.execute(Delete::new("slot").where_eq("status"), &["AV".into()])?;
            assert_eq!(count, 1);
            Ok(())
        })?;

        let mut txn = engine.begin()?;
        let rows = txn.query(Select::new("slot").where_eq("status"), &["WL".into()])?;
        let bookings = rows.iter().map(|r| r[3].clone()).collect::<Vec<_>>();
        assert_eq!(bookings, vec![Value::Integer(2), Value::Integer(1)]);
        assert!(txn.query(Select::new("slot").where_eq("id"), &[Value::Integer(550)])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_parameter_checks() -> Result<()> {
        let engine = seeded()?;
        let mut txn = engine.begin()?;

        assert!(matches!(
            txn.query(Select::new("slot").where_eq("id"), &[]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            txn.query(Select::new("slot").where_eq("id"), &["550; DROP TABLE slot".into()]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            txn.execute(Insert::new("slot"), &[Value::Integer(550), day(9)]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            txn.execute(Insert::new("slot"), &[Value::Integer(600)]),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            txn.execute(
                Update::new("slot").set("id").where_eq("id"),
                &[Value::Integer(1), Value::Integer(550)]
            ),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            txn.query(Select::new("nope"), &[]),
            Err(Error::Internal(_))
        ));
        Ok(())
    }

    #[test]
    fn test_sequences() -> Result<()> {
        let engine = seeded()?;
        let mut txn = engine.begin()?;
        // explicit ids push the sequence forward
        assert_eq!(txn.next_sequence("slot")?, 552);
        assert_eq!(txn.next_sequence("slot")?, 553);
        assert_eq!(txn.next_sequence("other")?, 1);
        txn.rollback()?;

        let mut txn = engine.begin()?;
        assert_eq!(txn.next_sequence("slot")?, 552);
        Ok(())
    }

    #[test]
    fn test_rollback_discards_rows() -> Result<()> {
        let engine = seeded()?;
        let result: Result<()> = engine.transact(|txn| {
            txn.execute(
                Update::new("slot").increment("bookings").where_eq("id"),
                &[Value::Integer(5), Value::Integer(550)],
            )?;
            Err(Error::Validation("operator cancelled".into()))
        });
        assert!(result.is_err());

        let mut txn = engine.begin()?;
        let rows = txn.query(Select::new("slot").where_eq("id"), &[Value::Integer(550)])?;
        assert_eq!(rows.rows[0][3], Value::Integer(0));
        Ok(())
    }

    #[test]
    fn test_for_update_conflicts() -> Result<()> {
        let engine = seeded()?;
        let mut first = engine.begin()?;
        let mut second = engine.begin()?;

        first.query(Select::new("slot").where_eq("id").for_update(), &[Value::Integer(550)])?;
        assert_eq!(
            second.query(Select::new("slot").where_eq("id").for_update(), &[Value::Integer(550)]),
            Err(Error::TransactionConflict)
        );
        // other rows stay free
        second.query(Select::new("slot").where_eq("id").for_update(), &[Value::Integer(551)])?;
        Ok(())
    }
}
