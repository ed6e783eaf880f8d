//! Memory-mapped CDB reader.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use super::format::*;
use crate::{Error, Result};

/// Read-only view of a finished CDB file.
pub struct CdbReader {
    mmap: Mmap,
}

impl CdbReader {
    /// Open and validate a CDB file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_SIZE as u64 {
            return Err(Error::InvalidArtifact(format!(
                "{:?} is {} bytes, shorter than the CDB header",
                path, len
            )));
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let reader = Self { mmap };
        reader.validate()?;

        Ok(reader)
    }

    fn validate(&self) -> Result<()> {
        let len = self.mmap.len() as u64;
        for table in 0..TABLE_COUNT {
            let pointer = self.pointer(table);
            let end = u64::from(pointer.position) + u64::from(pointer.slots) * SLOT_SIZE as u64;
            if u64::from(pointer.position) < HEADER_SIZE as u64 || end > len {
                return Err(Error::InvalidArtifact(format!(
                    "hash table {} out of bounds ({}..{} of {})",
                    table, pointer.position, end, len
                )));
            }
        }
        Ok(())
    }

    fn pointer(&self, table: usize) -> TablePointer {
        let offset = table * SLOT_SIZE;
        TablePointer::from_bytes(&self.mmap[offset..offset + SLOT_SIZE])
    }

    /// Number of records, counted from the hash table sizes.
    pub fn len(&self) -> usize {
        (0..TABLE_COUNT)
            .map(|t| self.pointer(t).slots as usize / 2)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the first record stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let hash = cdb_hash(key);
        let pointer = self.pointer(table_index(hash));
        let slots = pointer.slots as usize;
        if slots == 0 {
            return None;
        }

        let mut idx = start_slot(hash, slots);
        for _ in 0..slots {
            let offset = pointer.position as usize + idx * SLOT_SIZE;
            let slot_hash = read_u32(&self.mmap, offset);
            let record = read_u32(&self.mmap, offset + 4) as usize;
            if record == 0 {
                return None;
            }
            if slot_hash == hash {
                if let Some((k, v)) = self.record_at(record) {
                    if k == key {
                        return Some(v);
                    }
                }
            }
            idx = (idx + 1) % slots;
        }

        None
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over all records in file order.
    pub fn iter(&self) -> CdbIter<'_> {
        CdbIter {
            reader: self,
            position: HEADER_SIZE,
            end: self.pointer(0).position as usize,
        }
    }

    fn record_at(&self, position: usize) -> Option<(&[u8], &[u8])> {
        let data = &self.mmap[..];
        if position + RECORD_HEADER_SIZE > data.len() {
            return None;
        }
        let key_len = read_u32(data, position) as usize;
        let value_len = read_u32(data, position + 4) as usize;
        let key_start = position + RECORD_HEADER_SIZE;
        let value_start = key_start + key_len;
        let value_end = value_start + value_len;
        if value_end > data.len() {
            return None;
        }
        Some((&data[key_start..value_start], &data[value_start..value_end]))
    }
}

/// Iterator over the `(key, value)` records of a [`CdbReader`].
pub struct CdbIter<'a> {
    reader: &'a CdbReader,
    position: usize,
    end: usize,
}

impl<'a> Iterator for CdbIter<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.end {
            return None;
        }
        let (key, value) = self.reader.record_at(self.position)?;
        self.position += RECORD_HEADER_SIZE + key.len() + value.len();
        Some((key, value))
    }
}
