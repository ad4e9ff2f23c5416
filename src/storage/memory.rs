use std::{
    collections::{btree_map, BTreeMap},
    ops::RangeBounds,
};

use crate::{
    error::Result,
    storage::engine::{Engine, EngineIterator, Status},
};

/// Storage engine holding everything in a `BTreeMap`. Nothing survives the
/// process; used for throwaway sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Bytes of all live keys and values
    size: u64,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn entry_size(key: &[u8], value: &[u8]) -> u64 {
        (key.len() + value.len()) as u64
    }
}

impl Engine for MemoryEngine {
    type EngineIterator<'a> = MemoryEngineIterator<'a>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.size += Self::entry_size(&key, &value);
        if let Some(old) = self.data.insert(key.clone(), value) {
            self.size -= Self::entry_size(&key, &old);
        }
        Ok(())
    }

    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(&key).cloned())
    }

    fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        if let Some(old) = self.data.remove(&key) {
            self.size -= Self::entry_size(&key, &old);
        }
        Ok(())
    }

    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_> {
        MemoryEngineIterator(self.data.range(range))
    }

    fn status(&mut self) -> Result<Status> {
        Ok(Status {
            name: "memory".to_string(),
            keys: self.data.len() as u64,
            size: self.size,
            disk_size: 0,
            live_disk_size: 0,
        })
    }
}

pub struct MemoryEngineIterator<'a>(btree_map::Range<'a, Vec<u8>, Vec<u8>>);

impl EngineIterator for MemoryEngineIterator<'_> {}

impl Iterator for MemoryEngineIterator<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, value) = self.0.next()?;
        Some(Ok((key.clone(), value.clone())))
    }
}

impl DoubleEndedIterator for MemoryEngineIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let (key, value) = self.0.next_back()?;
        Some(Ok((key.clone(), value.clone())))
    }
}
