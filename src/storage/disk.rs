use std::{
    collections::{BTreeMap, btree_map},
    fs::{File, OpenOptions},
    io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

use crate::{error::Result, storage::engine::{Engine, EngineIterator, Status}};

/// Compact on open once more than this share of the log is dead entries
const COMPACT_THRESHOLD: f64 = 0.5;

/// Entry header: key length (u32) and value length (i32, -1 for tombstones)
const HEADER_LEN: u64 = 8;

/// Maps each live key to the (offset, length) of its latest value in the log
type KeyDir = BTreeMap<Vec<u8>, (u64, u32)>;

/// Append-only log storage engine.
///
/// Every write appends `[key_len][value_len][key][value]` to a single file and
/// records the value position in an in-memory key directory. Deletes append a
/// tombstone. The key directory is rebuilt by replaying the log on open, and a
/// torn entry at the tail (a crash mid-write) is truncated away.
pub struct DiskEngine {
    keydir: KeyDir,
    log: Log,
}

impl DiskEngine {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut log = Log::open(path.into())?;
        let keydir = log.build_keydir()?;
        let mut engine = Self { keydir, log };

        let status = engine.status()?;
        if status.garbage_ratio() > COMPACT_THRESHOLD {
            tracing::debug!(garbage = status.garbage_ratio(), "storage log over compaction threshold");
            engine.compact()?;
        }
        Ok(engine)
    }

    /// Rewrites the log with live entries only.
    pub fn compact(&mut self) -> Result<()> {
        let mut tmp_path = self.log.path.clone();
        tmp_path.set_extension("compact");

        let mut new_log = Log::open(tmp_path)?;
        new_log.file.set_len(0)?;
        let mut new_keydir = KeyDir::new();
        for (key, (offset, len)) in self.keydir.iter() {
            let value = self.log.read_value(*offset, *len)?;
            let position = new_log.write_entry(key, Some(&value))?;
            new_keydir.insert(key.clone(), position);
        }
        new_log.file.sync_all()?;

        std::fs::rename(&new_log.path, &self.log.path)?;
        new_log.path = self.log.path.clone();
        tracing::info!(
            path = %self.log.path.display(),
            keys = new_keydir.len(),
            "compacted storage log"
        );

        self.log = new_log;
        self.keydir = new_keydir;
        Ok(())
    }
}

impl Engine for DiskEngine {
    type EngineIterator<'a> = DiskEngineIterator<'a>;

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let position = self.log.write_entry(&key, Some(&value))?;
        self.keydir.insert(key, position);
        Ok(())
    }

    fn get(&mut self, key: Vec<u8>) -> Result<Option<Vec<u8>>> {
        match self.keydir.get(&key) {
            Some((offset, len)) => Ok(Some(self.log.read_value(*offset, *len)?)),
            None => Ok(None),
        }
    }

    fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        if self.keydir.remove(&key).is_some() {
            self.log.write_entry(&key, None)?;
        }
        Ok(())
    }

    fn scan(&mut self, range: impl std::ops::RangeBounds<Vec<u8>>) -> Self::EngineIterator<'_> {
        DiskEngineIterator {
            inner: self.keydir.range(range),
            log: &mut self.log,
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.log.file.sync_all()?)
    }

    fn status(&mut self) -> Result<Status> {
        let (size, live_disk_size) = self.keydir.iter().fold((0, 0), |(size, live), (key, (_, len))| {
            let logical = key.len() as u64 + *len as u64;
            (size + logical, live + HEADER_LEN + logical)
        });
        Ok(Status {
            name: "disk".to_string(),
            keys: self.keydir.len() as u64,
            size,
            disk_size: self.log.file.metadata()?.len(),
            live_disk_size,
        })
    }
}

pub struct DiskEngineIterator<'a> {
    inner: btree_map::Range<'a, Vec<u8>, (u64, u32)>,
    log: &'a mut Log,
}

impl<'a> DiskEngineIterator<'a> {
    fn read(&mut self, item: (&Vec<u8>, &(u64, u32))) -> Result<(Vec<u8>, Vec<u8>)> {
        let (key, (offset, len)) = item;
        Ok((key.clone(), self.log.read_value(*offset, *len)?))
    }
}

impl<'a> EngineIterator for DiskEngineIterator<'a> {}

impl<'a> Iterator for DiskEngineIterator<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(self.read(item))
    }
}

impl<'a> DoubleEndedIterator for DiskEngineIterator<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let item = self.inner.next_back()?;
        Some(self.read(item))
    }
}

struct Log {
    path: PathBuf,
    file: File,
}

impl Log {
    fn open(path: PathBuf) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self { path, file })
    }

    fn build_keydir(&mut self) -> Result<KeyDir> {
        let file_len = self.file.metadata()?.len();
        let mut reader = BufReader::new(&mut self.file);
        let mut offset = reader.seek(SeekFrom::Start(0))?;
        let mut keydir = KeyDir::new();
        let mut torn_at = None;

        while offset < file_len {
            match Self::read_entry(&mut reader, offset, file_len) {
                Ok((key, value_len, entry_len)) => {
                    match value_len {
                        Some(len) => {
                            keydir.insert(key.clone(), (offset + HEADER_LEN + key.len() as u64, len));
                        }
                        None => {
                            keydir.remove(&key);
                        }
                    }
                    offset += entry_len;
                }
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                    torn_at = Some(offset);
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        drop(reader);

        if let Some(offset) = torn_at {
            tracing::warn!(
                path = %self.path.display(),
                offset,
                "truncating torn entry at the end of the storage log"
            );
            self.file.set_len(offset)?;
        }
        Ok(keydir)
    }

    /// Reads one entry, returning its key, value length (None for a
    /// tombstone) and total length on disk.
    ///
    /// Lengths are checked against `file_len` before anything is allocated,
    /// so a corrupt header reads as a torn entry.
    fn read_entry(
        reader: &mut BufReader<&mut File>,
        offset: u64,
        file_len: u64,
    ) -> std::io::Result<(Vec<u8>, Option<u32>, u64)> {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf)?;
        let key_len = u32::from_be_bytes(len_buf);
        reader.read_exact(&mut len_buf)?;
        let value_len = i32::from_be_bytes(len_buf);

        let key_end = offset + HEADER_LEN + key_len as u64;
        if key_end > file_len {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        let mut key = vec![0; key_len as usize];
        reader.read_exact(&mut key)?;

        let value_len = if value_len >= 0 {
            if key_end + value_len as u64 > file_len {
                return Err(ErrorKind::UnexpectedEof.into());
            }
            reader.seek_relative(value_len as i64)?;
            Some(value_len as u32)
        } else {
            None
        };
        let entry_len = HEADER_LEN + key_len as u64 + value_len.unwrap_or(0) as u64;
        Ok((key, value_len, entry_len))
    }

    /// Appends an entry, returning the position of its value.
    fn write_entry(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<(u64, u32)> {
        let key_len = key.len() as u32;
        let value_len = value.map_or(0, |v| v.len() as u32);
        let encoded_len = value.map_or(-1, |v| v.len() as i32);

        let offset = self.file.seek(SeekFrom::End(0))?;
        let capacity = HEADER_LEN as usize + key.len() + value_len as usize;
        let mut writer = BufWriter::with_capacity(capacity, &mut self.file);
        writer.write_all(&key_len.to_be_bytes())?;
        writer.write_all(&encoded_len.to_be_bytes())?;
        writer.write_all(key)?;
        if let Some(value) = value {
            writer.write_all(value)?;
        }
        writer.flush()?;

        Ok((offset + HEADER_LEN + key_len as u64, value_len))
    }

    fn read_value(&mut self, offset: u64, len: u32) -> Result<Vec<u8>> {
        let mut value = vec![0; len as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut value)?;
        Ok(value)
    }
}
