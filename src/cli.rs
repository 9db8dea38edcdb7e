use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tube-feed",
    version,
    about = "Background YouTube search poller with API key rotation and a paginated video API",
    long_about = "Polls the YouTube search API on a fixed interval, rotating across up to three API keys as their daily quota runs out, and serves the collected videos through a paginated JSON API."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Server port
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the server and the background fetcher (default)
    Serve,

    /// Load and validate the configuration, then print it with keys redacted
    CheckConfig,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
