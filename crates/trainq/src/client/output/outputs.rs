use crate::client::run::RunReport;
use crate::config::AppConfig;

#[derive(clap::ValueEnum, Clone, Copy)]
pub enum Outputs {
    Cli,
    Json,
}

pub trait Output {
    fn print_config_check(&self, config: &AppConfig);
    fn print_run_report(&self, report: &RunReport);

    fn print_error(&self, error: anyhow::Error);
}
