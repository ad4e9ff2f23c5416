use std::ops::{Bound, RangeBounds};

use crate::error::Result;

/// Ordered byte-level key/value engine underneath the MVCC layer.
///
/// Keys are compared lexicographically; the MVCC layer relies on that order
/// for its version and prefix scans.
pub trait Engine {
    type EngineIterator<'a>: EngineIterator
    where
        Self: 'a;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>>;
    fn delete(&mut self, key: Vec<u8>) -> Result<()>;
    fn scan(&mut self, range: impl RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_>;

    /// Makes previous writes durable. In-memory engines have nothing to do.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn status(&mut self) -> Result<Status>;

    /// Prefix scan, turned into the range `[prefix, prefix+1)`.
    ///
    /// Trailing `0xff` bytes cannot be incremented, so they are dropped
    /// before bumping the last byte; an all-`0xff` prefix scans to the end.
    fn scan_prefix(&mut self, prefix: Vec<u8>) -> Self::EngineIterator<'_> {
        let start = Bound::Included(prefix.clone());
        let mut upper = prefix;
        while upper.last() == Some(&0xff) {
            upper.pop();
        }
        let end = match upper.last_mut() {
            Some(last) => {
                *last += 1;
                Bound::Excluded(upper)
            }
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }
}

/// Engine statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub name: String,
    /// Number of live keys
    pub keys: u64,
    /// Bytes of live keys and values
    pub size: u64,
    /// Bytes on disk, dead entries included
    pub disk_size: u64,
    /// Bytes on disk taken by live entries
    pub live_disk_size: u64,
}

impl Status {
    /// Share of the disk footprint taken by dead entries
    pub fn garbage_ratio(&self) -> f64 {
        if self.disk_size == 0 {
            return 0.0;
        }
        self.disk_size.saturating_sub(self.live_disk_size) as f64 / self.disk_size as f64
    }
}

/// Storage engine iterator, traversable from both ends
pub trait EngineIterator: DoubleEndedIterator<Item = Result<(Vec<u8>, Vec<u8>)>> {}

#[cfg(test)]
mod tests {
    use super::Engine;
    use crate::{
        error::Result,
        storage::{disk::DiskEngine, memory::MemoryEngine},
    };
    use std::ops::Bound;

    fn point_operations(mut eng: impl Engine) -> Result<()> {
        assert_eq!(eng.get(b"doctor/10".to_vec())?, None);

        eng.set(b"doctor/10".to_vec(), b"Dr. Hale".to_vec())?;
        assert_eq!(eng.get(b"doctor/10".to_vec())?, Some(b"Dr. Hale".to_vec()));

        eng.set(b"doctor/10".to_vec(), b"Dr. Hale, MD".to_vec())?;
        assert_eq!(eng.get(b"doctor/10".to_vec())?, Some(b"Dr. Hale, MD".to_vec()));

        eng.delete(b"doctor/10".to_vec())?;
        assert_eq!(eng.get(b"doctor/10".to_vec())?, None);

        eng.set(b"".to_vec(), vec![])?;
        assert_eq!(eng.get(b"".to_vec())?, Some(vec![]));
        Ok(())
    }

    fn range_scans(mut eng: impl Engine) -> Result<()> {
        eng.set(b"patient/88".to_vec(), b"Ruiz".to_vec())?;
        eng.set(b"appointment/550".to_vec(), b"AV".to_vec())?;
        eng.set(b"doctor/10".to_vec(), b"Hale".to_vec())?;
        eng.set(b"searches/77".to_vec(), b"550".to_vec())?;
        eng.set(b"appointment/551".to_vec(), b"AC".to_vec())?;

        let mut iter = eng.scan((
            Bound::Included(b"a".to_vec()),
            Bound::Excluded(b"e".to_vec()),
        ));
        let (key, _) = iter.next().expect("missing first key")?;
        assert_eq!(key, b"appointment/550".to_vec());
        let (key, _) = iter.next().expect("missing second key")?;
        assert_eq!(key, b"appointment/551".to_vec());
        let (key, _) = iter.next().expect("missing third key")?;
        assert_eq!(key, b"doctor/10".to_vec());
        assert!(iter.next().is_none());
        drop(iter);

        let mut iter = eng.scan((
            Bound::Included(b"b".to_vec()),
            Bound::Excluded(b"z".to_vec()),
        ));
        let (key, _) = iter.next_back().expect("missing last key")?;
        assert_eq!(key, b"searches/77".to_vec());
        let (key, _) = iter.next_back().expect("missing key")?;
        assert_eq!(key, b"patient/88".to_vec());
        Ok(())
    }

    fn prefix_scans(mut eng: impl Engine) -> Result<()> {
        eng.set(b"appointment/550".to_vec(), b"AV".to_vec())?;
        eng.set(b"appointment/551".to_vec(), b"AC".to_vec())?;
        eng.set(b"appointmenu".to_vec(), b"x".to_vec())?;
        eng.set(b"doctor/10".to_vec(), b"Hale".to_vec())?;
        eng.set(vec![0x01, 0xff], b"high".to_vec())?;
        eng.set(vec![0x01, 0xff, 0x07], b"higher".to_vec())?;
        eng.set(vec![0x02], b"next".to_vec())?;

        let keys = eng
            .scan_prefix(b"appointment/".to_vec())
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(
            keys,
            vec![b"appointment/550".to_vec(), b"appointment/551".to_vec()]
        );

        let keys = eng
            .scan_prefix(vec![0x01, 0xff])
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(keys, vec![vec![0x01, 0xff], vec![0x01, 0xff, 0x07]]);
        Ok(())
    }

    #[test]
    fn test_memory() -> Result<()> {
        point_operations(MemoryEngine::new())?;
        range_scans(MemoryEngine::new())?;
        prefix_scans(MemoryEngine::new())?;
        Ok(())
    }

    #[test]
    fn test_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        point_operations(DiskEngine::open(dir.path().join("point.log"))?)?;
        range_scans(DiskEngine::open(dir.path().join("range.log"))?)?;
        prefix_scans(DiskEngine::open(dir.path().join("prefix.log"))?)?;
        Ok(())
    }
}
