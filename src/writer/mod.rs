//! Artifact writers.
//!
//! Both writers build into a sibling `<dest>.tmp` and publish it with a
//! single rename, so a reader of `<dest>` sees either the previous
//! artifact or the complete new one.
//!
//! - [`StringArtifactWriter`]: static CDB string map for `domain`/`string`
//! - [`RangeArtifactWriter`]: LMDB range map for `ip`

mod range;
mod string;

pub use range::{RangeArtifactWriter, INITIAL_MAP_SIZE, TABLE_NAME};
pub use string::StringArtifactWriter;

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Capability shared by the artifact formats.
pub trait ArtifactWriter: Sized {
    /// Start building the artifact that will replace `dest`.
    fn begin(dest: &Path) -> Result<Self>;

    /// Add one entry.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Complete the artifact and publish it at `dest`.
    ///
    /// Returns the number of entries written.
    fn finalize(self) -> Result<usize>;
}

/// Drive `W` over `entries` from begin to publication.
pub fn write_artifact<W, I>(dest: &Path, entries: I) -> Result<usize>
where
    W: ArtifactWriter,
    I: IntoIterator<Item = io::Result<(Vec<u8>, Vec<u8>)>>,
{
    let mut writer = W::begin(dest)?;
    for entry in entries {
        let (key, value) = entry?;
        writer.put(&key, &value)?;
    }
    writer.finalize()
}

/// `<path>.tmp`
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Atomically move a finished artifact into place.
fn publish(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|source| Error::PublishFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// Remove a file if it exists.
fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("removed stale {:?}", path);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/etc/dnsdist/db/domains.cdb")),
            PathBuf::from("/etc/dnsdist/db/domains.cdb.tmp")
        );
        assert_eq!(temp_path(Path::new("ips")), PathBuf::from("ips.tmp"));
    }

    #[test]
    fn test_publish_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        let temp = temp_path(&dest);
        fs::write(&dest, b"old").unwrap();
        fs::write(&temp, b"new").unwrap();

        publish(&temp, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert!(!temp.exists());
    }

    #[test]
    fn test_publish_missing_temp_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out");
        fs::write(&dest, b"old").unwrap();

        let err = publish(&temp_path(&dest), &dest).unwrap_err();
        assert!(matches!(err, Error::PublishFailed { .. }));
        assert_eq!(fs::read(&dest).unwrap(), b"old");
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale");
        remove_if_exists(&path).unwrap();

        fs::write(&path, b"x").unwrap();
        remove_if_exists(&path).unwrap();
        assert!(!path.exists());
    }
}
