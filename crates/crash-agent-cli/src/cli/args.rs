use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;

use super::parsers::{parse_rfc3339_utc, parse_threshold};

/// Settings layered over the config file and `CRASH_AGENT_*` variables.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// TOML file with agent settings. Unknown keys are rejected.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Collector URL (http or https).
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Mean-damage increase that counts as a crash, within (0.0, 1.0].
    #[arg(long, value_parser = parse_threshold)]
    pub threshold: Option<f64>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario JSON file.
    #[arg(long, value_name = "FILE")]
    pub scenario: PathBuf,
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    /// Record payloads in-process instead of posting them.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Extra ticks to run after the scenario while deliveries are pending.
    #[arg(long, default_value_t = 50)]
    pub settle_ticks: u32,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Scenario JSON file.
    #[arg(long, value_name = "FILE")]
    pub scenario: PathBuf,
    #[command(flatten)]
    pub overrides: ConfigOverrides,
    /// Zero-based tick index. Defaults to the last tick.
    #[arg(long)]
    pub tick: Option<usize>,
    /// Report timestamp (RFC 3339). Defaults to now.
    #[arg(long, value_parser = parse_rfc3339_utc)]
    pub at: Option<DateTime<Utc>>,
}
