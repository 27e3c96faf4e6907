use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use cli_table::ColorChoice;

use crate::client::output::outputs::Outputs;

#[derive(ValueEnum, Clone, Copy)]
pub enum ColorPolicy {
    /// Use colors if the stdout is detected to be a terminal.
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

impl From<ColorPolicy> for ColorChoice {
    fn from(policy: ColorPolicy) -> Self {
        match policy {
            ColorPolicy::Auto => ColorChoice::Auto,
            ColorPolicy::Always => ColorChoice::Always,
            ColorPolicy::Never => ColorChoice::Never,
        }
    }
}

// Common CLI options
#[derive(Parser)]
pub struct CommonOpts {
    /// Sets console color policy
    #[arg(
        long,
        default_value_t = ColorPolicy::Auto,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS"),
        hide_short_help(true)
    )]
    pub colors: ColorPolicy,

    /// Sets output formatting
    #[arg(
        long,
        env = "TRAINQ_OUTPUT_MODE",
        default_value_t = Outputs::Cli,
        value_enum,
        global = true,
        help_heading("GLOBAL OPTIONS")
    )]
    pub output_mode: Outputs,

    /// Turn on a more detailed log output
    #[arg(long, global = true, env = "TRAINQ_DEBUG", help_heading("GLOBAL OPTIONS"))]
    pub debug: bool,
}

// Root CLI options
#[derive(Parser)]
#[command(author, about, version)]
#[command(disable_help_subcommand(true))]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Runs all jobs of a configuration file and prints a report
    Run(RunOpts),
    /// Validates a configuration file without running anything
    Check(CheckOpts),
}

#[derive(Parser)]
pub struct RunOpts {
    /// Path to the TOML configuration
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Cancel jobs that are still unfinished after this time, overrides the configuration
    #[arg(long, value_parser = parse_human_duration)]
    pub timeout: Option<std::time::Duration>,
}

#[derive(Parser)]
pub struct CheckOpts {
    /// Path to the TOML configuration
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,
}

fn parse_human_duration(value: &str) -> Result<std::time::Duration, humantime::DurationError> {
    humantime::parse_duration(value)
}
