use anyhow::Context;
use clap::{CommandFactory, FromArgMatches};
use cli_table::ColorChoice;

use trainq::client::output::cli::CliOutput;
use trainq::client::output::json::JsonOutput;
use trainq::client::output::outputs::{Output, Outputs};
use trainq::client::run::run_config;
use trainq::common::cli::{CheckOpts, ColorPolicy, CommonOpts, RootOptions, RunOpts, SubCommand};
use trainq::common::setup::setup_logging;
use trainq::config::load_config;

// Commands

async fn command_run(printer: &dyn Output, opts: RunOpts) -> anyhow::Result<()> {
    let mut config = load_config(&opts.config)
        .with_context(|| format!("Cannot load configuration {}", opts.config.display()))?;
    if opts.timeout.is_some() {
        config.timeout = opts.timeout;
    }
    log::info!(
        "Running {} job(s) on {} resource(s)",
        config.jobs.len(),
        config.total_resource_count()
    );
    let report = run_config(config).await?;
    printer.print_run_report(&report);
    if !report.is_success() {
        anyhow::bail!("Some jobs did not complete");
    }
    Ok(())
}

fn command_check(printer: &dyn Output, opts: CheckOpts) -> anyhow::Result<()> {
    let config = load_config(&opts.config)
        .with_context(|| format!("Cannot load configuration {}", opts.config.display()))?;
    printer.print_config_check(&config);
    Ok(())
}

fn make_printer(opts: &CommonOpts) -> Box<dyn Output> {
    let color_policy: ColorChoice = opts.colors.into();
    match opts.colors {
        ColorPolicy::Always => colored::control::set_override(true),
        ColorPolicy::Never => colored::control::set_override(false),
        ColorPolicy::Auto => {}
    }
    match opts.output_mode {
        Outputs::Cli => Box::new(CliOutput::new(color_policy)),
        Outputs::Json => Box::new(JsonOutput),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> trainq::Result<()> {
    let matches = RootOptions::command().get_matches();
    let top_opts = match RootOptions::from_arg_matches(&matches) {
        Ok(opts) => opts,
        Err(error) => error.exit(),
    };

    setup_logging(top_opts.common.debug);

    let printer = make_printer(&top_opts.common);

    let result = match top_opts.subcmd {
        SubCommand::Run(opts) => command_run(printer.as_ref(), opts).await,
        SubCommand::Check(opts) => command_check(printer.as_ref(), opts),
    };

    if let Err(e) = result {
        printer.print_error(e);
        std::process::exit(1);
    }

    Ok(())
}
