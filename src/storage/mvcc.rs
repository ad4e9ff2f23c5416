use std::{collections::{BTreeMap, HashSet}, sync::{Arc, Mutex, MutexGuard}};

use serde::{Deserialize, Serialize};

use crate::{error::{Error, Result}, storage::{engine::{Engine, Status}, keycode::{deserialize_key, serialize_key}}};

/// Transaction version number type
pub type Version = u64;

/// Snapshot-isolated transactions over a shared storage engine.
///
/// Every write is stored under `(key, version)`. A transaction sees the
/// latest version that was committed before it began, plus its own writes.
/// Writing a key that another live or later transaction already wrote fails
/// with [`Error::TransactionConflict`] (first writer wins).
pub struct Mvcc<E: Engine> {
    engine: Arc<Mutex<E>>,
}

impl<E: Engine> Clone for Mvcc<E> {
    fn clone(&self) -> Self {
        Self { engine: self.engine.clone() }
    }
}

impl<E: Engine> Mvcc<E> {
    pub fn new(eng: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(eng)),
        }
    }

    pub fn begin(&self) -> Result<MvccTransaction<E>> {
        MvccTransaction::begin(self.engine.clone())
    }

    /// Statistics of the underlying engine; counts every stored version.
    pub fn status(&self) -> Result<Status> {
        self.engine.lock()?.status()
    }

    /// Rolls back transactions left active by a previous process.
    ///
    /// Must run before any transaction of this process begins, since every
    /// active marker found is treated as abandoned.
    pub fn recover(&self) -> Result<usize> {
        let versions = {
            let mut engine = self.engine.lock()?;
            MvccTransaction::scan_active(&mut engine)?
        };
        for version in versions.iter() {
            let txn = MvccTransaction {
                engine: self.engine.clone(),
                state: TransactionState {
                    version: *version,
                    active_versions: HashSet::new(),
                },
            };
            txn.rollback()?;
            tracing::warn!(version, "rolled back abandoned transaction");
        }
        Ok(versions.len())
    }
}

pub struct MvccTransaction<E: Engine> {
    engine: Arc<Mutex<E>>,
    state: TransactionState,
}

/// Snapshot taken when the transaction began
pub struct TransactionState {
    pub version: Version,
    /// Transactions still running at begin time; their writes stay invisible
    pub active_versions: HashSet<Version>,
}

impl TransactionState {
    fn is_visible(&self, version: Version) -> bool {
        if self.active_versions.contains(&version) {
            return false;
        }
        version <= self.version
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum MvccKey {
    NextVersion,
    TxnActive(Version),
    /// Write set entry, removed on commit, used to undo on rollback
    TxnWrite(Version, #[serde(with = "serde_bytes")] Vec<u8>),
    Version(#[serde(with = "serde_bytes")] Vec<u8>, Version),
}

impl MvccKey {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(&self)
    }

    pub fn decode(data: Vec<u8>) -> Result<Self> {
        deserialize_key(&data)
    }
}

/// Prefixes of [`MvccKey`]; variant order must match so that an encoded
/// prefix is a byte prefix of the encoded keys it covers.
#[derive(Debug, Serialize, Deserialize)]
pub enum MvccKeyPrefix {
    NextVersion,
    TxnActive,
    TxnWrite(Version),
    Version(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl MvccKeyPrefix {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serialize_key(&self)
    }
}

impl<E: Engine> MvccTransaction<E> {
    pub fn begin(eng: Arc<Mutex<E>>) -> Result<Self> {
        let mut engine = eng.lock()?;

        let next_version = match engine.get(MvccKey::NextVersion.encode()?)? {
            Some(value) => bincode::deserialize(&value)?,
            None => 1,
        };

        engine.set(
            MvccKey::NextVersion.encode()?,
            bincode::serialize(&(next_version + 1))?,
        )?;

        let active_versions = Self::scan_active(&mut engine)?;

        engine.set(MvccKey::TxnActive(next_version).encode()?, vec![])?;
        drop(engine);

        tracing::trace!(version = next_version, active = active_versions.len(), "begin transaction");
        Ok(Self {
            engine: eng,
            state: TransactionState {
                version: next_version,
                active_versions,
            },
        })
    }

    pub fn version(&self) -> Version {
        self.state.version
    }

    /// Commits by forgetting the write set; the versions themselves stay.
    ///
    /// Removing the active marker is the commit point. If a later step
    /// fails the transaction is still committed, and a following
    /// [`rollback`](Self::rollback) only clears what is left of the write set.
    pub fn commit(&self) -> Result<()> {
        self.finish(false)?;
        tracing::trace!(version = self.state.version, "commit transaction");
        Ok(())
    }

    /// Rolls back by deleting every version this transaction wrote.
    pub fn rollback(&self) -> Result<()> {
        self.finish(true)?;
        tracing::trace!(version = self.state.version, "rollback transaction");
        Ok(())
    }

    /// Clears the write set and the active marker, and with `undo` also the
    /// versions the write set points at. Nothing is undone once the active
    /// marker is gone.
    fn finish(&self, undo: bool) -> Result<()> {
        let version = self.state.version;
        let mut engine = self.engine.lock()?;

        let active = MvccKey::TxnActive(version).encode()?;
        let undo = undo && engine.get(active.clone())?.is_some();
        if !undo {
            engine.delete(active.clone())?;
        }

        let written = engine
            .scan_prefix(MvccKeyPrefix::TxnWrite(version).encode()?)
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<Result<Vec<_>>>()?;

        for marker in written {
            if undo {
                let MvccKey::TxnWrite(_, raw_key) = MvccKey::decode(marker.clone())? else {
                    return Err(Error::Internal(format!("unexpected key in write set of {}", version)));
                };
                engine.delete(MvccKey::Version(raw_key, version).encode()?)?;
            }
            engine.delete(marker)?;
        }

        if undo {
            engine.delete(active)?;
        }
        engine.flush()
    }

    pub fn set(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.write_inner(key, Some(value))
    }

    pub fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.write_inner(key, None)
    }

    /// Rewrites the visible value of `key` unchanged, so that any concurrent
    /// transaction writing the same key conflicts with this one. Returns
    /// whether the key exists.
    pub fn claim(&self, key: Vec<u8>) -> Result<bool> {
        let value = self.get(key.clone())?;
        let exists = value.is_some();
        self.write_inner(key, value)?;
        Ok(exists)
    }

    /// Latest value of `key` visible to this transaction
    pub fn get(&self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let mut engine = self.engine.lock()?;

        let from = MvccKey::Version(key.clone(), 0).encode()?;
        let to = MvccKey::Version(key, self.state.version).encode()?;
        let mut iter = engine.scan(from..=to).rev();

        while let Some((key, value)) = iter.next().transpose()? {
            match MvccKey::decode(key)? {
                MvccKey::Version(_, version) => {
                    if self.state.is_visible(version) {
                        return Ok(bincode::deserialize(&value)?);
                    }
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key in version scan: {:?}", other)));
                }
            }
        }
        Ok(None)
    }

    /// Scans keys with prefix, returning latest visible version per key
    pub fn scan_prefix(&self, prefix: Vec<u8>) -> Result<Vec<ScanResult>> {
        let mut eng = self.engine.lock()?;
        let mut enc_prefix = MvccKeyPrefix::Version(prefix).encode()?;
        // drop the byte string terminator so longer keys match too
        enc_prefix.truncate(enc_prefix.len() - 2);

        let mut iter = eng.scan_prefix(enc_prefix);
        let mut results = BTreeMap::new();
        while let Some((key, value)) = iter.next().transpose()? {
            match MvccKey::decode(key)? {
                MvccKey::Version(raw_key, version) => {
                    if self.state.is_visible(version) {
                        match bincode::deserialize(&value)? {
                            Some(raw_value) => results.insert(raw_key, raw_value),
                            None => results.remove(&raw_key),
                        };
                    }
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key in prefix scan: {:?}", other)));
                }
            }
        }

        Ok(results
            .into_iter()
            .map(|(key, value)| ScanResult { key, value })
            .collect())
    }

    fn write_inner(&self, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<()> {
        let mut engine = self.engine.lock()?;

        // Any version at or above the oldest transaction we cannot see
        let from = MvccKey::Version(
            key.clone(),
            self.state
                .active_versions
                .iter()
                .min()
                .copied()
                .unwrap_or(self.state.version + 1),
        )
        .encode()?;
        let to = MvccKey::Version(key.clone(), u64::MAX).encode()?;

        if let Some((k, _)) = engine.scan(from..=to).last().transpose()? {
            match MvccKey::decode(k)? {
                MvccKey::Version(_, version) => {
                    if !self.state.is_visible(version) {
                        tracing::debug!(
                            version = self.state.version,
                            conflicting = version,
                            "write conflict"
                        );
                        return Err(Error::TransactionConflict);
                    }
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key in conflict check: {:?}", other)));
                }
            }
        }

        engine.set(
            MvccKey::TxnWrite(self.state.version, key.clone()).encode()?,
            vec![],
        )?;

        engine.set(
            MvccKey::Version(key, self.state.version).encode()?,
            bincode::serialize(&value)?,
        )?;

        Ok(())
    }

    fn scan_active(engine: &mut MutexGuard<E>) -> Result<HashSet<Version>> {
        let mut active_versions = HashSet::new();
        let mut iter = engine.scan_prefix(MvccKeyPrefix::TxnActive.encode()?);

        while let Some((key, _)) = iter.next().transpose()? {
            match MvccKey::decode(key)? {
                MvccKey::TxnActive(version) => {
                    active_versions.insert(version);
                }
                other => {
                    return Err(Error::Internal(format!("unexpected key in active set: {:?}", other)));
                }
            }
        }
        Ok(active_versions)
    }
}

#[derive(Debug, PartialEq)]
pub struct ScanResult {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}
