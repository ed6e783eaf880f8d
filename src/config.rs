//! Configuration document types.
//!
//! The document has a single top-level `config` key:
//!
//! ```yaml
//! config:
//!   ipv4_max_cidr_value: 16
//!   ipv6_max_cidr_value: 48
//!   blocklists:
//!     - url: https://example.com/domains.txt
//!       file: /etc/dnsdist/db/domains.cdb
//!       type: domain
//!     - url: file:///srv/lists/ips.txt
//!       file: /etc/dnsdist/db/ips.lmdb
//!       type: ip
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::address::PrefixPolicy;
use crate::{Error, Result};

/// Default configuration file name used by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "dnsdb.yml";

/// Kind of keys a blocklist holds, which selects the artifact writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlocklistKind {
    /// Domain names, stored in a static string map
    Domain,
    /// Arbitrary strings, same writer as `Domain`
    String,
    /// IP addresses and CIDR ranges, stored in a range map
    Ip,
}

impl BlocklistKind {
    /// Get the name of this kind as written in the configuration.
    pub fn name(&self) -> &'static str {
        match self {
            BlocklistKind::Domain => "domain",
            BlocklistKind::String => "string",
            BlocklistKind::Ip => "ip",
        }
    }

    /// Whether entries of this kind go to the static string map.
    pub fn is_string_map(&self) -> bool {
        matches!(self, BlocklistKind::Domain | BlocklistKind::String)
    }
}

/// A single configured blocklist.
#[derive(Debug, Clone, Deserialize)]
pub struct Blocklist {
    /// Source reference: `file://`, `http://` or `https://`
    pub url: String,
    /// Destination artifact path
    pub file: PathBuf,
    /// Key kind
    #[serde(rename = "type")]
    pub kind: BlocklistKind,
    /// Value stored for every key of a `domain`/`string` blocklist
    #[serde(default)]
    pub default_value: Option<String>,
}

impl Blocklist {
    /// Value bytes stored for each key; empty when unset.
    pub fn value_bytes(&self) -> &[u8] {
        self.default_value.as_deref().unwrap_or("").as_bytes()
    }
}

/// Per-run limits and the ordered list of blocklists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    /// Minimum accepted IPv4 prefix length
    #[serde(default)]
    pub ipv4_max_cidr_value: u8,
    /// Minimum accepted IPv6 prefix length
    #[serde(default)]
    pub ipv6_max_cidr_value: u8,
    #[serde(default)]
    pub blocklists: Vec<Blocklist>,
}

impl PipelineConfig {
    /// Prefix-length policy applied to every range in the run.
    pub fn prefix_policy(&self) -> PrefixPolicy {
        PrefixPolicy::new(self.ipv4_max_cidr_value, self.ipv6_max_cidr_value)
    }

    fn validate(&self) -> Result<()> {
        if self.ipv4_max_cidr_value > 32 {
            return Err(Error::Config(format!(
                "ipv4_max_cidr_value must be at most 32, got {}",
                self.ipv4_max_cidr_value
            )));
        }
        if self.ipv6_max_cidr_value > 128 {
            return Err(Error::Config(format!(
                "ipv6_max_cidr_value must be at most 128, got {}",
                self.ipv6_max_cidr_value
            )));
        }
        for blocklist in &self.blocklists {
            if blocklist.url.trim().is_empty() {
                return Err(Error::Config(format!(
                    "blocklist for {:?} has an empty url",
                    blocklist.file
                )));
            }
            if blocklist.file.as_os_str().is_empty() {
                return Err(Error::Config(format!(
                    "blocklist {} has an empty file",
                    blocklist.url
                )));
            }
        }
        Ok(())
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cfg {
    pub config: PipelineConfig,
}

impl Cfg {
    /// Parse and validate a configuration document.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let cfg: Cfg = serde_yaml::from_str(content)?;
        cfg.config.validate()?;
        Ok(cfg)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
