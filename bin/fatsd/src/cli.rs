use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

/// Command-line entrypoint for the fats control-plane daemon.
#[derive(Parser)]
#[command(name = "fatsd")]
#[command(author, version, about = "Single-node application-hosting control plane")]
pub struct Cli {
    /// Log verbosity, read from `LOG_LEVEL`; defaults to `INFO`.
    #[arg(short, long, env = "LOG_LEVEL", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Optional TOML configuration file, layered under `FATS_*` env vars.
    #[arg(short, long, env = "FATS_CONFIG")]
    pub config: Option<PathBuf>,
}
