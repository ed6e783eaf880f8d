//! dnsdb - Build DNS filter lookup databases from plain-text blocklists.
//!
//! Each configured blocklist is fetched from a local file or an HTTP(S)
//! URL, parsed one entry per line, and compiled into an on-disk database
//! that a DNS filter memory-maps at query time:
//!
//! - **domain / string** lists become a CDB file, a static hash map with
//!   O(1) exact lookups
//! - **ip** lists become an LMDB file holding one table, `db`, where each
//!   address or CIDR block is stored as `upper -> lower`
//!
//! # Quick Start
//!
//! ```ignore
//! use dnsdb::{Cfg, Pipeline};
//!
//! let cfg = Cfg::load("dnsdb.yml")?;
//! let pipeline = Pipeline::new(cfg.config)?;
//! let summary = pipeline.run();
//! println!("{} built, {} skipped", summary.built, summary.skipped);
//! ```
//!
//! # Rebuild Rules
//!
//! An artifact is only rebuilt when its source is newer than the file on
//! disk: the source mtime for `file://` URLs, the `Last-Modified` header
//! for HTTP. Every rebuild writes `<dest>.tmp` and renames it over
//! `<dest>`, so readers never see a half-written database.
//!
//! # Line Format
//!
//! ```text
//! example.com          # comments start at the first '#'
//! 10.0.0.1
//! 192.168.0.0/24
//! ```
//!
//! Blank lines and comment-only lines are ignored. CIDR blocks broader
//! than the configured minimum prefix length are rejected line by line.

mod error;

pub mod address;
pub mod cdb;
pub mod config;
pub mod freshness;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod writer;

// Re-export core types
pub use error::{EncodeError, Error, Result};

pub use address::{encode, EncodedRange, PrefixPolicy};
pub use config::{Blocklist, BlocklistKind, Cfg, PipelineConfig};
pub use freshness::should_rebuild;
pub use parser::LineParser;
pub use pipeline::{Outcome, Pipeline, RunSummary};
pub use source::{SourceFetcher, SourcePayload};
pub use writer::{ArtifactWriter, RangeArtifactWriter, StringArtifactWriter, TABLE_NAME};
