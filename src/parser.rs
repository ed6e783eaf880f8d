//! Blocklist line parser.
//!
//! Each line is cut at the first `#`, trimmed, and dropped when empty.
//! Lines may end in LF or CRLF. The parser works on bytes so that
//! string blocklists with non-UTF-8 content still compile.

use std::io::{self, BufRead};

/// Canonical form of a raw line, or `None` when nothing is left.
pub fn canonicalize(line: &[u8]) -> Option<&[u8]> {
    let line = match line.iter().position(|&b| b == b'#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let line = line.trim_ascii();

    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

/// Lazy iterator over the canonical lines of a reader.
pub struct LineParser<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(256),
        }
    }
}

impl<R: BufRead> Iterator for LineParser<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    if let Some(line) = canonicalize(&self.buf) {
                        return Some(Ok(line.to_vec()));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
