//! Constant database (CDB) file format for static string maps.
//!
//! A CDB file is built once and never modified. Lookups hash the key and
//! probe one of 256 open-addressing tables, so a query touches at most a
//! handful of pages of a memory-mapped file.
//!
//! # File Structure
//!
//! ```text
//! +------------------+
//! |  TABLE POINTERS  |  256 x (position u32, slot count u32), 2048 bytes
//! +------------------+
//! |     RECORDS      |  (key len u32, value len u32, key, value) ...
//! +------------------+
//! |   HASH TABLES    |  256 tables of (hash u32, record position u32) slots
//! +------------------+
//! ```
//!
//! All integers are little-endian. The format is the one produced by
//! `cdbmake`, so any CDB reader can consume the artifacts.

mod format;
mod reader;
mod writer;


pub use format::*;
pub use reader::{CdbIter, CdbReader};
pub use writer::CdbWriter;
