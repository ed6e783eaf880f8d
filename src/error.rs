//! Error types for dnsdb.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for blocklist compilation.
///
/// Every variant is fatal for the blocklist being processed; the driver
/// logs it and moves on to the next one.
#[derive(Error, Debug)]
pub enum Error {
    /// Network error or non-200 HTTP status
    #[error("error fetching {url}: {reason}")]
    SourceFetchFailed { url: String, reason: String },

    /// Missing or malformed Last-Modified header
    #[error("missing or invalid Last-Modified header for {url}")]
    SourceMetadataMissing { url: String },

    /// URL scheme is not file, http or https
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Source reference is not a URL at all
    #[error("invalid source URL: {0}")]
    InvalidSourceUrl(String),

    /// Writer could not create its output
    #[error("cannot open destination {path:?}: {reason}")]
    DestinationOpenFailed { path: PathBuf, reason: String },

    /// Store put, drop or commit failed
    #[error("store transaction failed: {0}")]
    StoreTransactionFailed(#[from] lmdb::Error),

    /// Atomic rename of the finished artifact failed
    #[error("cannot publish {from:?} to {to:?}: {source}")]
    PublishFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Finished artifact failed verification before publication
    #[error("invalid artifact: {0}")]
    InvalidArtifact(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for dnsdb operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for a single rejected line of an `ip` blocklist.
///
/// These never abort a build: the line is logged and skipped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// Not an IP address or CIDR
    #[error("invalid IP address or range: {0}")]
    AddressParseFailed(String),

    /// CIDR prefix shorter than the configured minimum
    #[error("{family} mask limit reached for range {range} (minimum prefix {minimum}), ignoring")]
    PrefixTooBroad {
        family: &'static str,
        range: String,
        minimum: u8,
    },
}
