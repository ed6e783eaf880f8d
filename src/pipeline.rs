//! Pipeline driver.
//!
//! Blocklists are processed one at a time, in configuration order:
//! acquire the source, consult the freshness gate, then hand the parsed
//! lines to the writer matching the blocklist kind. A failing blocklist is
//! logged and does not stop the run.

use std::io;

use crate::address::{encode, PrefixPolicy};
use crate::config::{Blocklist, PipelineConfig};
use crate::error::EncodeError;
use crate::freshness::should_rebuild;
use crate::parser::LineParser;
use crate::source::SourceFetcher;
use crate::writer::{write_artifact, RangeArtifactWriter, StringArtifactWriter};
use crate::Result;

/// What happened to one blocklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Artifact rebuilt and published with this many entries
    Built { handled: usize },
    /// Destination already up to date
    Skipped,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub built: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Whether every blocklist was built or skipped.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, result: &Result<Outcome>) {
        match result {
            Ok(Outcome::Built { .. }) => self.built += 1,
            Ok(Outcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Compiles every configured blocklist.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: SourceFetcher,
}

impl Pipeline {
    /// Create a pipeline with a default HTTP client.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Ok(Self::with_fetcher(config, SourceFetcher::new()?))
    }

    pub fn with_fetcher(config: PipelineConfig, fetcher: SourceFetcher) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process all blocklists in order, logging failures.
    pub fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        for blocklist in &self.config.blocklists {
            let result = self.process(blocklist);
            if let Err(e) = &result {
                log::error!(
                    "{} blocklist {} -> {}: {}",
                    blocklist.kind.name(),
                    blocklist.url,
                    blocklist.file.display(),
                    e
                );
            }
            summary.record(&result);
        }

        log::info!(
            "run finished: {} built, {} skipped, {} failed",
            summary.built,
            summary.skipped,
            summary.failed
        );
        summary
    }

    /// Process a single blocklist.
    pub fn process(&self, blocklist: &Blocklist) -> Result<Outcome> {
        let payload = self.fetcher.acquire(&blocklist.url)?;

        if !should_rebuild(&blocklist.file, payload.last_modified()) {
            log::info!("not modifying file {}", blocklist.file.display());
            return Ok(Outcome::Skipped);
        }

        let lines = payload.lines();
        let handled = if blocklist.kind.is_string_map() {
            let value = blocklist.value_bytes();
            write_artifact::<StringArtifactWriter, _>(
                &blocklist.file,
                lines.map(|line| line.map(|key| (key, value.to_vec()))),
            )?
        } else {
            write_artifact::<RangeArtifactWriter, _>(
                &blocklist.file,
                range_entries(lines, self.config.prefix_policy()),
            )?
        };

        log::info!("{} items handled for url {}", handled, blocklist.url);
        Ok(Outcome::Built { handled })
    }
}

/// Encode each line as `(upper, lower)`, logging and skipping rejects.
fn range_entries<R: io::BufRead>(
    lines: LineParser<R>,
    policy: PrefixPolicy,
) -> impl Iterator<Item = io::Result<(Vec<u8>, Vec<u8>)>> {
    lines.filter_map(move |line| {
        let token = match line {
            Ok(token) => token,
            Err(e) => return Some(Err(e)),
        };

        let encoded = std::str::from_utf8(&token)
            .map_err(|_| {
                EncodeError::AddressParseFailed(String::from_utf8_lossy(&token).into_owned())
            })
            .and_then(|token| encode(token, &policy));

        match encoded {
            Ok(range) => Some(Ok((range.upper_bytes(), range.lower_bytes()))),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    })
}
