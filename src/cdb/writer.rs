//! CDB file writer.

use std::io::{BufWriter, Seek, SeekFrom, Write};

use super::format::*;
use crate::{Error, Result};

/// Streaming CDB builder.
///
/// Records are written as they are added; the hash tables and the table
/// pointers are written by [`CdbWriter::finish`]. Until then the file is
/// not a valid CDB.
pub struct CdbWriter<W: Write + Seek> {
    out: BufWriter<W>,
    /// Offset where the next record goes
    position: u32,
    /// (hash, record position) of every record, in insertion order
    entries: Vec<(u32, u32)>,
}

impl<W: Write + Seek> CdbWriter<W> {
    /// Start a new CDB on `inner`, which must be empty and positioned at 0.
    pub fn new(inner: W) -> Result<Self> {
        let mut out = BufWriter::new(inner);
        // Table pointers are filled in by finish()
        out.write_all(&[0u8; HEADER_SIZE])?;

        Ok(Self {
            out,
            position: HEADER_SIZE as u32,
            entries: Vec::new(),
        })
    }

    /// Append a record. Duplicate keys are stored as separate records.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key_len = to_u32(key.len())?;
        let value_len = to_u32(value.len())?;
        let record_len = (RECORD_HEADER_SIZE as u32)
            .checked_add(key_len)
            .and_then(|n| n.checked_add(value_len))
            .ok_or_else(too_large)?;
        let next_position = self.position.checked_add(record_len).ok_or_else(too_large)?;

        self.out.write_all(&key_len.to_le_bytes())?;
        self.out.write_all(&value_len.to_le_bytes())?;
        self.out.write_all(key)?;
        self.out.write_all(value)?;

        self.entries.push((cdb_hash(key), self.position));
        self.position = next_position;
        Ok(())
    }

    /// Write the hash tables and table pointers, returning the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let mut entries = std::mem::take(&mut self.entries);
        // Stable: records of one table keep insertion order
        entries.sort_by_key(|(hash, _)| table_index(*hash));

        let mut pointers = [TablePointer::default(); TABLE_COUNT];
        let mut position = self.position;
        let mut rest = &entries[..];

        for (table, pointer) in pointers.iter_mut().enumerate() {
            let count = rest
                .iter()
                .take_while(|(hash, _)| table_index(*hash) == table)
                .count();
            let (chunk, tail) = rest.split_at(count);
            rest = tail;

            let slot_count = count * 2;
            *pointer = TablePointer {
                position,
                slots: to_u32(slot_count)?,
            };
            if slot_count == 0 {
                continue;
            }

            let mut slots = vec![(0u32, 0u32); slot_count];
            for &(hash, record) in chunk {
                let mut idx = start_slot(hash, slot_count);
                // Record positions are never 0, so 0 marks a free slot
                while slots[idx].1 != 0 {
                    idx = (idx + 1) % slot_count;
                }
                slots[idx] = (hash, record);
            }

            for (hash, record) in slots {
                self.out.write_all(&hash.to_le_bytes())?;
                self.out.write_all(&record.to_le_bytes())?;
            }

            let table_len = to_u32(slot_count * SLOT_SIZE)?;
            position = position.checked_add(table_len).ok_or_else(too_large)?;
        }

        self.out.seek(SeekFrom::Start(0))?;
        for pointer in &pointers {
            self.out.write_all(&pointer.to_bytes())?;
        }
        self.out.flush()?;

        self.out.into_inner().map_err(|e| Error::Io(e.into_error()))
    }
}

fn to_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| too_large())
}

fn too_large() -> Error {
    Error::InvalidArtifact("CDB file would exceed 4 GiB".to_string())
}
