//! dnsdb: compile the configured blocklists into DNS filter databases.

use clap::Parser;
use dnsdb::config::DEFAULT_CONFIG_FILE;
use dnsdb::{Cfg, Pipeline};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dnsdb")]
#[command(version)]
#[command(about = "Build DNS filter lookup databases from blocklists", long_about = None)]
struct Cli {
    /// Configuration file to use
    #[arg(long = "configfile", default_value = DEFAULT_CONFIG_FILE)]
    configfile: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Accept the single-dash `-configfile` spelling alongside `--configfile`.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| match arg.to_str() {
            Some(s) if s == "-configfile" || s.starts_with("-configfile=") => {
                OsString::from(format!("-{}", s))
            }
            _ => arg,
        })
        .collect()
}

fn main() {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let cfg = match Cfg::load(&cli.configfile) {
        Ok(cfg) => cfg,
        Err(e) => {
            log::error!("cannot load configuration {:?}: {}", cli.configfile, e);
            std::process::exit(1);
        }
    };

    let pipeline = match Pipeline::new(cfg.config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("cannot initialize pipeline: {}", e);
            std::process::exit(1);
        }
    };

    pipeline.run();
}
