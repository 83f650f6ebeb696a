use clap::{Parser, Subcommand};

mod args;
mod parsers;


pub use args::{ConfigArgs, ConfigOverrides, PreviewArgs, RunArgs};

#[derive(Debug, Parser)]
#[command(name = "crash-agent")]
#[command(
    about = "Replay vehicle damage scenarios through the crash telemetry agent",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Feed a scenario through the agent and report what was delivered.
    Run(RunArgs),
    /// Print the resolved agent configuration.
    Config(ConfigArgs),
    /// Print the payload a crash report at one scenario tick would carry.
    Preview(PreviewArgs),
}
