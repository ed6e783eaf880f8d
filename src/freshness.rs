//! Freshness gate: skip rebuilding artifacts whose source has not changed.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Decide whether `dest` must be rebuilt from a source last modified at
/// `source_last_modified`.
///
/// Returns `true` when the destination is missing, unreadable, or strictly
/// older than the source.
pub fn should_rebuild(dest: &Path, source_last_modified: SystemTime) -> bool {
    let mtime = match fs::metadata(dest).and_then(|m| m.modified()) {
        Ok(mtime) => mtime,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("{:?} does not exist yet", dest);
            return true;
        }
        Err(e) => {
            log::warn!("cannot read mtime of {:?}, rebuilding: {}", dest, e);
            return true;
        }
    };

    mtime < source_last_modified
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::time::Duration;

    fn set_mtime(path: &Path, time: SystemTime) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(time).unwrap();
    }

    #[test]
    fn test_missing_destination_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        assert!(should_rebuild(&dir.path().join("absent.cdb"), SystemTime::UNIX_EPOCH));
    }

    #[test]
    fn test_older_destination_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("list.cdb");
        fs::write(&dest, b"old").unwrap();

        let built = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&dest, built);

        assert!(should_rebuild(&dest, built + Duration::from_secs(1)));
    }

    #[test]
    fn test_equal_or_newer_destination_skips() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("list.cdb");
        fs::write(&dest, b"current").unwrap();

        let built = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        set_mtime(&dest, built);

        assert!(!should_rebuild(&dest, built));
        assert!(!should_rebuild(&dest, built - Duration::from_secs(60)));
    }
}
