use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use crash_agent_core::AgentConfig;

use crate::cli::{Commands, ConfigOverrides};

mod replay;
mod scenario;
mod support;


use self::replay::{ReplayOptions, preview_report, replay};
use self::scenario::Scenario;
use self::support::print_json;

pub(crate) fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => {
            let config = resolve_config(&args.overrides)?;
            let scenario = Scenario::load(&args.scenario)?;
            let options = ReplayOptions {
                dry_run: args.dry_run,
                settle_ticks: args.settle_ticks,
            };
            let summary = replay(&scenario, config, options)?;
            print_json(&summary)?;
        }
        Commands::Config(args) => {
            let config = resolve_config(&args.overrides)?;
            print_json(&config)?;
        }
        Commands::Preview(args) => {
            let config = resolve_config(&args.overrides)?;
            let scenario = Scenario::load(&args.scenario)?;
            let at = args.at.unwrap_or_else(Utc::now);
            let payload = preview_report(&scenario, &config, args.tick, at)?;
            print_json(&payload)?;
        }
    }
    Ok(())
}

/// Defaults, then the config file, then `CRASH_AGENT_*`, then flags.
pub(crate) fn resolve_config(overrides: &ConfigOverrides) -> Result<AgentConfig> {
    let mut config = match overrides.config.as_deref() {
        Some(path) => load_config_file(path)?,
        None => AgentConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid CRASH_AGENT_* environment")?;
    if let Some(endpoint) = &overrides.endpoint {
        config.endpoint.clone_from(endpoint);
    }
    if let Some(threshold) = overrides.threshold {
        config.damage_threshold = threshold;
    }
    config.validate().context("invalid agent configuration")?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<AgentConfig> {
    AgentConfig::from_toml_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))
}
