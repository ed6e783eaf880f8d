//! Range map writer (LMDB).
//!
//! Entries are keyed by the last address of a range and hold its first
//! address, in a single named table. A lookup for address `A` seeks the
//! first key `>= A` and matches when the stored lower bound is `<= A`.

use lmdb::{DatabaseFlags, Environment, EnvironmentFlags, RwTransaction, Transaction, WriteFlags};
use std::path::{Path, PathBuf};

use super::{publish, remove_if_exists, temp_path, with_suffix, ArtifactWriter};
use crate::{Error, Result};

/// Name of the table the DNS filter reads.
pub const TABLE_NAME: &str = "db";

/// Map size of a freshly opened store.
pub const INITIAL_MAP_SIZE: usize = 100 * 1024 * 1024;

/// Map sizes are kept a multiple of this.
const MAP_PAGE_SIZE: usize = 4096;

/// An open single-file LMDB environment that grows when it fills up.
struct MappedStore {
    env: Environment,
    map_size: usize,
}

impl MappedStore {
    fn open(path: &Path, map_size: usize) -> std::result::Result<Self, lmdb::Error> {
        let map_size = page_align(map_size);
        let env = Environment::new()
            .set_flags(EnvironmentFlags::NO_SUB_DIR | EnvironmentFlags::NO_READAHEAD)
            .set_max_dbs(1)
            .set_map_size(map_size)
            .open_with_permissions(path, 0o664)?;

        Ok(Self { env, map_size })
    }

    /// Run `op` in a read/write transaction and commit it.
    ///
    /// When the map fills up, the transaction is aborted, the map grown
    /// and `op` run again from scratch.
    fn update<F>(&mut self, mut op: F) -> Result<()>
    where
        F: FnMut(&mut RwTransaction<'_>) -> lmdb::Result<()>,
    {
        loop {
            let mut txn = self.env.begin_rw_txn()?;
            let result = match op(&mut txn) {
                Ok(()) => txn.commit(),
                Err(e) => {
                    txn.abort();
                    Err(e)
                }
            };

            match result {
                Ok(()) => return Ok(()),
                Err(lmdb::Error::MapFull) => self.grow()?,
                Err(e) => return Err(Error::StoreTransactionFailed(e)),
            }
        }
    }

    /// Grow the map by half. No transaction may be open.
    fn grow(&mut self) -> Result<()> {
        let new_size = page_align(self.map_size + self.map_size / 2);
        self.env.set_map_size(new_size)?;
        log::debug!("map full, grew from {} to {} bytes", self.map_size, new_size);
        self.map_size = new_size;
        Ok(())
    }
}

fn page_align(size: usize) -> usize {
    size.div_ceil(MAP_PAGE_SIZE).max(1) * MAP_PAGE_SIZE
}

fn lock_path(store: &Path) -> PathBuf {
    with_suffix(store, "-lock")
}

/// Builds an LMDB range map at `<dest>.tmp` and renames it onto `dest`.
///
/// Entries are buffered until [`ArtifactWriter::finalize`], which empties
/// the table in one transaction and bulk-loads it in a second one.
pub struct RangeArtifactWriter {
    dest: PathBuf,
    temp: PathBuf,
    store: MappedStore,
    ranges: Vec<(Vec<u8>, Vec<u8>)>,
}

impl RangeArtifactWriter {
    /// Begin with an explicit initial map size.
    pub fn begin_with_map_size(dest: &Path, map_size: usize) -> Result<Self> {
        let temp = temp_path(dest);
        remove_if_exists(&temp)?;
        remove_if_exists(&lock_path(&temp))?;

        let store = MappedStore::open(&temp, map_size).map_err(|e| Error::DestinationOpenFailed {
            path: temp.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
            store,
            ranges: Vec::new(),
        })
    }

    fn drop_table(store: &mut MappedStore) -> Result<()> {
        store.update(|txn| {
            let db = unsafe { txn.create_db(Some(TABLE_NAME), DatabaseFlags::empty())? };
            unsafe { txn.drop_db(db) }
        })
    }

    fn load_table(store: &mut MappedStore, ranges: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        store.update(|txn| {
            let db = unsafe { txn.create_db(Some(TABLE_NAME), DatabaseFlags::empty())? };
            for (upper, lower) in ranges {
                txn.put(db, upper, lower, WriteFlags::empty())?;
            }
            Ok(())
        })
    }
}

impl ArtifactWriter for RangeArtifactWriter {
    fn begin(dest: &Path) -> Result<Self> {
        Self::begin_with_map_size(dest, INITIAL_MAP_SIZE)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ranges.push((key.to_vec(), value.to_vec()));
        Ok(())
    }

    fn finalize(self) -> Result<usize> {
        let Self {
            dest,
            temp,
            mut store,
            ranges,
        } = self;

        Self::drop_table(&mut store)?;
        Self::load_table(&mut store, &ranges)?;
        // Close the environment before moving its file
        drop(store);

        publish(&temp, &dest)?;
        if let Err(e) = remove_if_exists(&lock_path(&temp)) {
            log::warn!("cannot remove {:?}: {}", lock_path(&temp), e);
        }

        Ok(ranges.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_artifact;
    use lmdb::Database;
    use std::io;

    fn open_table(path: &Path) -> (Environment, Database) {
        let env = Environment::new()
            .set_flags(EnvironmentFlags::NO_SUB_DIR)
            .set_max_dbs(1)
            .open(path)
            .unwrap();
        let db = env.open_db(Some(TABLE_NAME)).unwrap();
        (env, db)
    }

    fn lookup(path: &Path, key: &[u8]) -> Option<Vec<u8>> {
        let (env, db) = open_table(path);
        let txn = env.begin_ro_txn().unwrap();
        let value = match txn.get(db, &key) {
            Ok(value) => Some(value.to_vec()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => panic!("lookup failed: {e}"),
        };
        txn.abort();
        value
    }

    fn ranges(pairs: &[([u8; 4], [u8; 4])]) -> Vec<io::Result<(Vec<u8>, Vec<u8>)>> {
        pairs
            .iter()
            .map(|(u, l)| Ok((u.to_vec(), l.to_vec())))
            .collect()
    }

    #[test]
    fn test_build_and_publish() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");

        let written = write_artifact::<RangeArtifactWriter, _>(
            &dest,
            ranges(&[
                ([10, 0, 0, 1], [10, 0, 0, 1]),
                ([192, 168, 0, 255], [192, 168, 0, 0]),
            ]),
        )
        .unwrap();

        assert_eq!(written, 2);
        assert!(dest.is_file());
        assert!(!temp_path(&dest).exists());
        assert!(!lock_path(&temp_path(&dest)).exists());

        assert_eq!(lookup(&dest, &[10, 0, 0, 1]), Some(vec![10, 0, 0, 1]));
        assert_eq!(lookup(&dest, &[192, 168, 0, 255]), Some(vec![192, 168, 0, 0]));
        assert_eq!(lookup(&dest, &[192, 168, 0, 0]), None);
    }

    #[test]
    fn test_rebuild_leaves_no_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");

        write_artifact::<RangeArtifactWriter, _>(&dest, ranges(&[([1, 1, 1, 1], [1, 1, 1, 1])]))
            .unwrap();
        assert!(lookup(&dest, &[1, 1, 1, 1]).is_some());

        write_artifact::<RangeArtifactWriter, _>(&dest, ranges(&[([2, 2, 2, 2], [2, 2, 2, 0])]))
            .unwrap();
        assert_eq!(lookup(&dest, &[1, 1, 1, 1]), None);
        assert_eq!(lookup(&dest, &[2, 2, 2, 2]), Some(vec![2, 2, 2, 0]));
    }

    #[test]
    fn test_same_upper_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");

        write_artifact::<RangeArtifactWriter, _>(
            &dest,
            ranges(&[([9, 9, 9, 255], [9, 9, 9, 0]), ([9, 9, 9, 255], [9, 9, 9, 128])]),
        )
        .unwrap();

        assert_eq!(lookup(&dest, &[9, 9, 9, 255]), Some(vec![9, 9, 9, 128]));
    }

    #[test]
    fn test_empty_list_creates_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");

        let written = write_artifact::<RangeArtifactWriter, _>(&dest, ranges(&[])).unwrap();
        assert_eq!(written, 0);
        assert_eq!(lookup(&dest, &[1, 2, 3, 4]), None);
    }

    #[test]
    fn test_stale_temp_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");
        std::fs::write(temp_path(&dest), b"garbage from a crashed run").unwrap();

        write_artifact::<RangeArtifactWriter, _>(&dest, ranges(&[([5, 5, 5, 5], [5, 5, 5, 5])]))
            .unwrap();
        assert_eq!(lookup(&dest, &[5, 5, 5, 5]), Some(vec![5, 5, 5, 5]));
    }

    #[test]
    fn test_map_grows_when_full() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");

        let initial = 64 * 1024;
        let mut writer = RangeArtifactWriter::begin_with_map_size(&dest, initial).unwrap();
        let count: u32 = 50_000;
        for i in 0..count {
            let addr = (0x0a00_0000 + i).to_be_bytes();
            writer.put(&addr, &addr).unwrap();
        }
        assert_eq!(writer.finalize().unwrap(), count as usize);

        assert_eq!(lookup(&dest, &0x0a00_0000u32.to_be_bytes()), Some(vec![10, 0, 0, 0]));
        let last = (0x0a00_0000 + count - 1).to_be_bytes();
        assert_eq!(lookup(&dest, &last), Some(last.to_vec()));
    }

    #[test]
    fn test_grow_is_page_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MappedStore::open(&dir.path().join("store"), 100_000).unwrap();
        assert_eq!(store.map_size, 102_400);

        store.grow().unwrap();
        assert_eq!(store.map_size, 155_648);
        assert_eq!(store.map_size % MAP_PAGE_SIZE, 0);
    }

    #[test]
    fn test_previous_artifact_kept_until_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");
        write_artifact::<RangeArtifactWriter, _>(&dest, ranges(&[([1, 1, 1, 1], [1, 1, 1, 1])]))
            .unwrap();
        let before = std::fs::read(&dest).unwrap();

        let mut writer = RangeArtifactWriter::begin(&dest).unwrap();
        writer.put(&[2, 2, 2, 2], &[2, 2, 2, 2]).unwrap();
        // Abandon the build, as a crash before the rename would
        drop(writer);

        assert_eq!(std::fs::read(&dest).unwrap(), before);
        assert_eq!(lookup(&dest, &[1, 1, 1, 1]), Some(vec![1, 1, 1, 1]));
        assert_eq!(lookup(&dest, &[2, 2, 2, 2]), None);
    }

    #[test]
    fn test_read_error_aborts_without_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("ips.lmdb");
        write_artifact::<RangeArtifactWriter, _>(&dest, ranges(&[([1, 1, 1, 1], [1, 1, 1, 1])]))
            .unwrap();

        let mut input = ranges(&[([3, 3, 3, 3], [3, 3, 3, 3])]);
        input.push(Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection reset")));

        let result = write_artifact::<RangeArtifactWriter, _>(&dest, input);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(lookup(&dest, &[1, 1, 1, 1]), Some(vec![1, 1, 1, 1]));
        assert_eq!(lookup(&dest, &[3, 3, 3, 3]), None);
    }

    #[test]
    fn test_missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no/such/dir/ips.lmdb");

        let result = RangeArtifactWriter::begin(&dest);
        assert!(matches!(result, Err(Error::DestinationOpenFailed { .. })));
    }
}
