use serde_json::json;

use crate::client::output::outputs::Output;
use crate::client::run::RunReport;
use crate::config::AppConfig;

#[derive(Default)]
pub struct JsonOutput;

impl JsonOutput {
    fn print(&self, data: serde_json::Value) {
        println!("{data:#}");
    }
}

impl Output for JsonOutput {
    fn print_config_check(&self, config: &AppConfig) {
        self.print(json!({
            "valid": true,
            "owner": config.owner,
            "scheduler": config.scheduler,
            "resources": config.total_resource_count(),
            "algorithms": config.algorithms.iter().map(|a| &a.id).collect::<Vec<_>>(),
            "datasets": config.datasets.iter().map(|d| &d.id).collect::<Vec<_>>(),
            "jobs": config.jobs.len(),
        }))
    }

    fn print_run_report(&self, report: &RunReport) {
        self.print(json!(report))
    }

    fn print_error(&self, error: anyhow::Error) {
        self.print(json!({
            "error": format!("{error:?}")
        }))
    }
}
