//! CDB format constants and hashing.

/// Number of hash tables.
pub const TABLE_COUNT: usize = 256;

/// Size of one table pointer or hash slot in bytes.
pub const SLOT_SIZE: usize = 8;

/// Size of the table pointer block at the start of the file.
pub const HEADER_SIZE: usize = TABLE_COUNT * SLOT_SIZE;

/// Size of the length prefix before each record.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Initial value of the CDB hash.
const HASH_START: u32 = 5381;

/// The CDB hash: `h = ((h << 5) + h) ^ byte`, starting at 5381.
pub fn cdb_hash(key: &[u8]) -> u32 {
    key.iter().fold(HASH_START, |h, &b| {
        (h << 5).wrapping_add(h) ^ u32::from(b)
    })
}

/// Table a hash belongs to.
#[inline]
pub fn table_index(hash: u32) -> usize {
    (hash & 0xff) as usize
}

/// First slot probed for a hash in a table of `slots` slots.
#[inline]
pub fn start_slot(hash: u32, slots: usize) -> usize {
    ((hash >> 8) as usize) % slots
}

/// Location and size of one hash table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TablePointer {
    /// Byte offset of the first slot
    pub position: u32,
    /// Number of slots (twice the number of records in the table)
    pub slots: u32,
}

impl TablePointer {
    pub fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let mut out = [0u8; SLOT_SIZE];
        out[..4].copy_from_slice(&self.position.to_le_bytes());
        out[4..].copy_from_slice(&self.slots.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            position: read_u32(bytes, 0),
            slots: read_u32(bytes, 4),
        }
    }
}

/// Read a little-endian u32 at `offset`. The caller checks bounds.
#[inline]
pub fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}
