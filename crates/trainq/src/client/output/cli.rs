use cli_table::format::{Justify, Separator};
use cli_table::{Cell, CellStruct, Color, ColorChoice, Style, Table, TableStruct, print_stdout};
use colored::Colorize;

use trainq_core::job::{JobDetail, JobStatus};
use trainq_core::resources::{ResourceInfo, ResourceStatus};

use crate::client::output::outputs::Output;
use crate::client::run::RunReport;
use crate::common::format::{format_cost, human_memory_mb, human_seconds};
use crate::config::AppConfig;

pub const JOB_COLOR_CANCELLED: Color = Color::Magenta;
pub const JOB_COLOR_FAILED: Color = Color::Red;
pub const JOB_COLOR_COMPLETED: Color = Color::Green;
pub const JOB_COLOR_RUNNING: Color = Color::Yellow;

pub struct CliOutput {
    color_policy: ColorChoice,
}

impl CliOutput {
    pub fn new(color_policy: ColorChoice) -> CliOutput {
        CliOutput { color_policy }
    }

    fn print_vertical_table(&self, rows: Vec<Vec<CellStruct>>) {
        let table = rows.table().separator(
            Separator::builder()
                .column(Some(Default::default()))
                .build(),
        );
        self.print_table(table);
    }

    fn print_horizontal_table(&self, rows: Vec<Vec<CellStruct>>, header: Vec<CellStruct>) {
        let table = rows
            .table()
            .separator(
                Separator::builder()
                    .title(Some(Default::default()))
                    .column(Some(Default::default()))
                    .build(),
            )
            .title(header);
        self.print_table(table);
    }

    fn print_table(&self, table: TableStruct) {
        let table = table.color_choice(self.color_policy);
        if let Err(e) = print_stdout(table) {
            log::error!("Cannot print table to stdout: {e:?}");
        }
    }

    fn print_jobs(&self, jobs: &[JobDetail]) {
        let rows: Vec<_> = jobs
            .iter()
            .map(|job| {
                vec![
                    job.job_id.cell().justify(Justify::Right),
                    job.owner.as_str().cell(),
                    job.algorithm_id.as_str().cell(),
                    job.dataset_id.as_str().cell(),
                    job_status_to_cell(job.status),
                    format!("{}%", job.progress_percentage)
                        .cell()
                        .justify(Justify::Right),
                    job.resource_id
                        .map(|r| r.to_string())
                        .unwrap_or_default()
                        .cell(),
                    job.runtime_seconds
                        .map(human_seconds)
                        .unwrap_or_default()
                        .cell(),
                    format_cost(job.estimated_cost)
                        .cell()
                        .justify(Justify::Right),
                    job.actual_cost
                        .map(format_cost)
                        .unwrap_or_default()
                        .cell()
                        .justify(Justify::Right),
                    job_outcome(job).cell(),
                ]
            })
            .collect();
        let header = vec![
            "Id".cell().bold(true),
            "Owner".cell().bold(true),
            "Algorithm".cell().bold(true),
            "Dataset".cell().bold(true),
            "Status".cell().bold(true),
            "Progress".cell().bold(true),
            "Resource".cell().bold(true),
            "Runtime".cell().bold(true),
            "Est. cost".cell().bold(true),
            "Cost".cell().bold(true),
            "Result".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_rejected(&self, report: &RunReport) {
        let rows: Vec<_> = report
            .rejected()
            .map(|s| {
                vec![
                    format!("#{}", s.index).cell(),
                    s.owner.as_str().cell(),
                    s.algorithm_id.as_str().cell(),
                    s.dataset_id.as_str().cell(),
                    s.error
                        .as_deref()
                        .unwrap_or_default()
                        .cell()
                        .foreground_color(Some(JOB_COLOR_FAILED)),
                ]
            })
            .collect();
        if rows.is_empty() {
            return;
        }
        println!("{}", "Rejected submissions".bold());
        let header = vec![
            "Job".cell().bold(true),
            "Owner".cell().bold(true),
            "Algorithm".cell().bold(true),
            "Dataset".cell().bold(true),
            "Reason".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }

    fn print_resources(&self, resources: &[ResourceInfo]) {
        let rows: Vec<_> = resources
            .iter()
            .map(|r| {
                let gpus = match (&r.capacity.gpu_type, r.capacity.gpu_count) {
                    (_, 0) => String::new(),
                    (Some(gpu_type), count) => format!("{count}x {gpu_type}"),
                    (None, count) => count.to_string(),
                };
                vec![
                    r.resource_id.cell().justify(Justify::Right),
                    r.name.as_str().cell(),
                    resource_status_to_cell(r.status),
                    r.capacity.cpu_cores.cell().justify(Justify::Right),
                    human_memory_mb(r.capacity.memory_mb()).cell(),
                    gpus.cell(),
                    r.stats.jobs_completed.cell().justify(Justify::Right),
                    human_seconds(r.stats.total_runtime_seconds).cell(),
                ]
            })
            .collect();
        let header = vec![
            "Id".cell().bold(true),
            "Name".cell().bold(true),
            "Status".cell().bold(true),
            "CPUs".cell().bold(true),
            "Memory".cell().bold(true),
            "GPUs".cell().bold(true),
            "Completed jobs".cell().bold(true),
            "Total runtime".cell().bold(true),
        ];
        self.print_horizontal_table(rows, header);
    }
}

impl Output for CliOutput {
    fn print_config_check(&self, config: &AppConfig) {
        let scheduler = &config.scheduler;
        let rows = vec![
            vec![
                "Default owner".cell().bold(true),
                config.owner.as_str().cell(),
            ],
            vec![
                "Resources".cell().bold(true),
                config.total_resource_count().cell(),
            ],
            vec![
                "Algorithms".cell().bold(true),
                config
                    .algorithms
                    .iter()
                    .map(|a| {
                        if a.enabled {
                            format!("{} ({})", a.id, a.kind)
                        } else {
                            format!("{} ({}, disabled)", a.id, a.kind)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
                    .cell(),
            ],
            vec!["Datasets".cell().bold(true), config.datasets.len().cell()],
            vec!["Jobs".cell().bold(true), config.jobs.len().cell()],
            vec![
                "Dispatch order".cell().bold(true),
                format!("{:?}", scheduler.dispatch_order).cell(),
            ],
            vec![
                "Backfill".cell().bold(true),
                yes_no(scheduler.backfill).cell(),
            ],
            vec![
                "Time limit enforced".cell().bold(true),
                yes_no(scheduler.enforce_time_limit).cell(),
            ],
            vec![
                "Retry backoff".cell().bold(true),
                humantime::format_duration(scheduler.retry_backoff).cell(),
            ],
        ];
        self.print_vertical_table(rows);
        println!("{}", "Configuration is valid".green());
    }

    fn print_run_report(&self, report: &RunReport) {
        if !report.jobs.is_empty() {
            self.print_jobs(&report.jobs);
        }
        self.print_rejected(report);
        if !report.resources.is_empty() {
            self.print_resources(&report.resources);
        }

        for charge in &report.charges {
            println!(
                "Charged {} to {}",
                format_cost(charge.amount).bold(),
                charge.owner
            );
        }
        if !report.cancelled_on_timeout.is_empty() {
            println!(
                "{}",
                format!(
                    "{} job(s) cancelled after reaching the timeout",
                    report.cancelled_on_timeout.len()
                )
                .magenta()
            );
        }

        let summary = format!(
            "{} completed, {} failed, {} cancelled, {} rejected in {}",
            report.count_jobs(JobStatus::Completed),
            report.count_jobs(JobStatus::Failed),
            report.count_jobs(JobStatus::Cancelled),
            report.rejected().count(),
            human_seconds(report.duration_secs)
        );
        if report.is_success() {
            println!("{}", summary.green());
        } else {
            println!("{}", summary.red());
        }
    }

    fn print_error(&self, error: anyhow::Error) {
        eprintln!("{error:?}");
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn job_status_to_cell(status: JobStatus) -> CellStruct {
    let color = match status {
        JobStatus::Created | JobStatus::Queued => None,
        JobStatus::Running => Some(JOB_COLOR_RUNNING),
        JobStatus::Completed => Some(JOB_COLOR_COMPLETED),
        JobStatus::Failed => Some(JOB_COLOR_FAILED),
        JobStatus::Cancelled => Some(JOB_COLOR_CANCELLED),
    };
    status.to_string().to_uppercase().cell().foreground_color(color)
}

fn resource_status_to_cell(status: ResourceStatus) -> CellStruct {
    let color = match status {
        ResourceStatus::Available => Some(Color::Green),
        ResourceStatus::Busy => Some(Color::Yellow),
        ResourceStatus::Maintenance | ResourceStatus::Offline => Some(Color::Red),
    };
    status.to_string().to_uppercase().cell().foreground_color(color)
}

/// Metrics of a completed job, the error of a failed one.
fn job_outcome(job: &JobDetail) -> String {
    if let Some(error) = &job.error {
        return error.clone();
    }
    let mut metrics: Vec<_> = job
        .metrics
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    metrics.sort_unstable();
    match &job.artifact {
        Some(artifact) if metrics.is_empty() => artifact.to_string(),
        Some(artifact) => format!("{artifact}\n{}", metrics.join(", ")),
        None => metrics.join(", "),
    }
}
