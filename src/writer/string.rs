//! Static string map writer (CDB).

use ahash::AHashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use super::{publish, temp_path, ArtifactWriter};
use crate::cdb::{CdbReader, CdbWriter};
use crate::{Error, Result};

/// Builds a CDB file at `<dest>.tmp` and renames it onto `dest`.
///
/// Keys are de-duplicated: the first occurrence is kept, later ones are
/// counted and dropped.
pub struct StringArtifactWriter {
    dest: PathBuf,
    temp: PathBuf,
    writer: CdbWriter<File>,
    seen: AHashSet<Vec<u8>>,
    duplicates: usize,
}

impl StringArtifactWriter {
    /// Number of repeated keys dropped so far.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

impl ArtifactWriter for StringArtifactWriter {
    fn begin(dest: &Path) -> Result<Self> {
        let temp = temp_path(dest);
        // File::create truncates whatever an interrupted run left behind
        let file = File::create(&temp).map_err(|e| Error::DestinationOpenFailed {
            path: temp.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
            writer: CdbWriter::new(file)?,
            seen: AHashSet::new(),
            duplicates: 0,
        })
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.seen.contains(key) {
            self.duplicates += 1;
            return Ok(());
        }
        self.writer.add(key, value)?;
        self.seen.insert(key.to_vec());
        Ok(())
    }

    fn finalize(self) -> Result<usize> {
        let file = self.writer.finish()?;
        file.sync_all()?;
        drop(file);

        let written = self.seen.len();
        let stored = CdbReader::open(&self.temp)?.len();
        if stored != written {
            return Err(Error::InvalidArtifact(format!(
                "{:?} holds {} records, expected {}",
                self.temp, stored, written
            )));
        }

        if self.duplicates > 0 {
            log::debug!("{} duplicate keys dropped for {:?}", self.duplicates, self.dest);
        }

        publish(&self.temp, &self.dest)?;
        Ok(written)
    }
}
