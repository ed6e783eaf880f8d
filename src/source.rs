//! Source acquisition for blocklists.
//!
//! A source reference is a URL:
//! - `file:///absolute/path`: the text after `file://` is opened read-only as
//!   written, last-modified is the file mtime
//! - `http://` / `https://`: fetched with GET, last-modified comes from the
//!   `Last-Modified` response header, which is mandatory
//!
//! Gzip-compressed payloads are detected by their magic bytes and
//! decompressed transparently.

use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::header::LAST_MODIFIED;
use reqwest::{StatusCode, Url};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::parser::LineParser;
use crate::{Error, Result};

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const FILE_PREFIX: &str = "file://";

/// An opened blocklist source.
pub struct SourcePayload {
    reader: Box<dyn BufRead>,
    last_modified: SystemTime,
}

impl SourcePayload {
    /// Wrap an already-open reader, decompressing it if it is gzip.
    pub fn new<R: Read + 'static>(inner: R, last_modified: SystemTime) -> io::Result<Self> {
        Ok(Self {
            reader: decode(inner)?,
            last_modified,
        })
    }

    pub fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    /// Canonical lines of the payload.
    pub fn lines(self) -> LineParser<Box<dyn BufRead>> {
        LineParser::new(self.reader)
    }
}

impl std::fmt::Debug for SourcePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcePayload")
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

fn decode<R: Read + 'static>(mut inner: R) -> io::Result<Box<dyn BufRead>> {
    let mut head = [0u8; GZIP_MAGIC.len()];
    let mut filled = 0;
    while filled < head.len() {
        match inner.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    let reader = io::Cursor::new(head[..filled].to_vec()).chain(inner);
    if head[..filled] == GZIP_MAGIC {
        log::debug!("source is gzip compressed");
        return Ok(Box::new(BufReader::new(GzDecoder::new(reader))));
    }
    Ok(Box::new(BufReader::new(reader)))
}

/// Opens blocklist sources, sharing one HTTP client across blocklists.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    /// Create a fetcher with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dnsdb/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Open `reference` and report when it was last modified.
    pub fn acquire(&self, reference: &str) -> Result<SourcePayload> {
        if let Some(path) = reference.strip_prefix(FILE_PREFIX) {
            return open_file(Path::new(path), reference);
        }

        let url =
            Url::parse(reference).map_err(|_| Error::InvalidSourceUrl(reference.to_string()))?;

        match url.scheme() {
            "file" => Err(Error::InvalidSourceUrl(reference.to_string())),
            "http" | "https" => self.fetch_http(url, reference),
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }

    fn fetch_http(&self, url: Url, reference: &str) -> Result<SourcePayload> {
        let fetch_failed = |reason: String| Error::SourceFetchFailed {
            url: reference.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_failed(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(fetch_failed(format!("HTTP status {}", status.as_u16())));
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_last_modified)
            .ok_or_else(|| Error::SourceMetadataMissing {
                url: reference.to_string(),
            })?;

        SourcePayload::new(response, last_modified).map_err(|e| fetch_failed(e.to_string()))
    }
}

/// The rest of a `file://` reference is used verbatim as the path.
fn open_file(path: &Path, reference: &str) -> Result<SourcePayload> {
    let fetch_failed = |e: io::Error| Error::SourceFetchFailed {
        url: reference.to_string(),
        reason: e.to_string(),
    };

    let file = File::open(path).map_err(fetch_failed)?;
    let last_modified = file.metadata().and_then(|m| m.modified()).map_err(fetch_failed)?;

    SourcePayload::new(file, last_modified).map_err(fetch_failed)
}

/// Parse an HTTP date (`Mon, 02 Jan 2006 15:04:05 GMT`).
///
/// Any RFC 2822 zone is accepted, and so is a trailing `UTC`.
pub fn parse_last_modified(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    let parsed = chrono::DateTime::parse_from_rfc2822(value).or_else(|e| {
        match value.strip_suffix("UTC") {
            Some(stem) => chrono::DateTime::parse_from_rfc2822(&format!("{}GMT", stem)),
            None => Err(e),
        }
    });

    match parsed {
        Ok(dt) => Some(SystemTime::from(dt)),
        Err(e) => {
            log::warn!("cannot parse Last-Modified {:?}: {}", value, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;

    fn file_url(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn gzip(content: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap()
    }

    /// Hands out one byte per read, like a slow chunked body.
    struct Trickle(io::Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(1);
            self.0.read(&mut buf[..len])
        }
    }

    fn collect(payload: SourcePayload) -> Vec<String> {
        payload
            .lines()
            .map(|l| String::from_utf8(l.unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_last_modified() {
        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);

        assert_eq!(parse_last_modified("Wed, 21 Oct 2015 07:28:00 GMT"), Some(expected));
        assert_eq!(parse_last_modified("Wed, 21 Oct 2015 07:28:00 UTC"), Some(expected));
        assert_eq!(parse_last_modified("Wed, 21 Oct 2015 00:28:00 MST"), Some(expected));
        assert_eq!(parse_last_modified("Wed, 21 Oct 2015 09:28:00 +0200"), Some(expected));
    }

    #[test]
    fn test_parse_last_modified_rejects_garbage() {
        assert_eq!(parse_last_modified(""), None);
        assert_eq!(parse_last_modified("yesterday"), None);
        assert_eq!(parse_last_modified("2015-10-21T07:28:00Z"), None);
    }

    #[test]
    fn test_acquire_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt");
        fs::write(&path, "a.com\n# c\nb.com\n").unwrap();
        let mtime = fs::metadata(&path).unwrap().modified().unwrap();

        let fetcher = SourceFetcher::new().unwrap();
        let payload = fetcher.acquire(&file_url(&path)).unwrap();

        assert_eq!(payload.last_modified(), mtime);
        assert_eq!(collect(payload), vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_acquire_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.txt.gz");
        fs::write(&path, gzip(b"zipped.com\n10.0.0.0/8 # net\n")).unwrap();

        let fetcher = SourceFetcher::new().unwrap();
        let payload = fetcher.acquire(&file_url(&path)).unwrap();

        assert_eq!(collect(payload), vec!["zipped.com", "10.0.0.0/8"]);
    }

    #[test]
    fn test_gzip_detected_across_short_reads() {
        let reader = Trickle(io::Cursor::new(gzip(b"zipped.com\n")));
        let payload = SourcePayload::new(reader, SystemTime::UNIX_EPOCH).unwrap();

        assert_eq!(collect(payload), vec!["zipped.com"]);
    }

    #[test]
    fn test_short_reads_of_plain_text() {
        let reader = Trickle(io::Cursor::new(b"a.com\nb.com".to_vec()));
        let payload = SourcePayload::new(reader, SystemTime::UNIX_EPOCH).unwrap();

        assert_eq!(collect(payload), vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_single_byte_source() {
        let payload = SourcePayload::new(io::Cursor::new(b"x".to_vec()), SystemTime::UNIX_EPOCH)
            .unwrap();
        assert_eq!(collect(payload), vec!["x"]);
    }

    #[test]
    fn test_acquire_file_path_taken_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let lists = dir.path().join("lists#v2?rev=1");
        fs::create_dir(&lists).unwrap();
        let path = lists.join("list.txt");
        fs::write(&path, "hash.com\n").unwrap();

        let fetcher = SourceFetcher::new().unwrap();
        let payload = fetcher.acquire(&file_url(&path)).unwrap();

        assert_eq!(collect(payload), vec!["hash.com"]);
    }

    #[test]
    fn test_acquire_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = SourceFetcher::new().unwrap();
        let result = fetcher.acquire(&file_url(&dir.path().join("absent.txt")));

        assert!(matches!(result, Err(Error::SourceFetchFailed { .. })));
    }

    #[test]
    fn test_unsupported_scheme() {
        let fetcher = SourceFetcher::new().unwrap();
        let result = fetcher.acquire("ftp://example.com/list.txt");

        assert!(matches!(result, Err(Error::UnsupportedScheme(ref s)) if s == "ftp"));
    }

    #[test]
    fn test_not_a_url() {
        let fetcher = SourceFetcher::new().unwrap();
        let result = fetcher.acquire("/etc/hosts");

        assert!(matches!(result, Err(Error::InvalidSourceUrl(_))));
    }

    #[test]
    fn test_empty_source() {
        let payload = SourcePayload::new(io::empty(), SystemTime::UNIX_EPOCH).unwrap();
        assert!(collect(payload).is_empty());
    }
}
