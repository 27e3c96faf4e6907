use std::pin::pin;
use std::time::Duration;

use serde::Serialize;
use tokio::task::LocalSet;

use trainq_core::control::{SchedulerRef, start_scheduler};
use trainq_core::job::{JobDetail, JobStatus, round_cost};
use trainq_core::resources::ResourceInfo;
use trainq_core::{JobId, Map};

use crate::common::error::error;
use crate::config::AppConfig;
use crate::local::create_services;

/// Time given to the post-processing loop to post the last charges and
/// notifications before the scheduler is dropped.
const FLUSH_DELAY: Duration = Duration::from_millis(100);

#[derive(Serialize, Debug, Clone)]
pub struct SubmissionRecord {
    /// Index of the job in the configuration.
    pub index: usize,
    pub owner: String,
    pub algorithm_id: String,
    pub dataset_id: String,
    pub job_id: Option<JobId>,
    pub estimated_cost: Option<f64>,
    pub error: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OwnerCharge {
    pub owner: String,
    pub amount: f64,
}

#[derive(Serialize, Debug)]
pub struct RunReport {
    pub submissions: Vec<SubmissionRecord>,
    pub jobs: Vec<JobDetail>,
    pub resources: Vec<ResourceInfo>,
    pub charges: Vec<OwnerCharge>,
    /// Jobs cancelled because the run timed out.
    pub cancelled_on_timeout: Vec<JobId>,
    pub duration_secs: f64,
}

impl RunReport {
    pub fn rejected(&self) -> impl Iterator<Item = &SubmissionRecord> {
        self.submissions.iter().filter(|s| s.error.is_some())
    }

    pub fn count_jobs(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }

    /// True if every admitted job completed and nothing was rejected.
    pub fn is_success(&self) -> bool {
        self.rejected().next().is_none()
            && self
                .jobs
                .iter()
                .all(|job| job.status == JobStatus::Completed)
    }
}

/// Runs all jobs of the configuration against an in-process scheduler and
/// collects the results.
pub async fn run_config(config: AppConfig) -> crate::Result<RunReport> {
    LocalSet::new().run_until(run_with_scheduler(config)).await
}

async fn run_with_scheduler(config: AppConfig) -> crate::Result<RunReport> {
    let services = create_services(&config);
    let (scheduler, scheduler_future) = start_scheduler(config.scheduler.clone(), services)?;
    let started = tokio::time::Instant::now();

    let mut scheduler_future = pin!(scheduler_future);
    let (submissions, cancelled_on_timeout) = tokio::select! {
        _ = &mut scheduler_future => error("Scheduler stopped unexpectedly".to_string()),
        result = run_jobs(&scheduler, &config) => result,
    }?;

    // The future never finishes, this only lets it work for a while
    let _ = tokio::time::timeout(FLUSH_DELAY, &mut scheduler_future).await;

    let jobs = scheduler.jobs();
    Ok(RunReport {
        charges: compute_charges(&jobs),
        submissions,
        jobs,
        resources: scheduler.resources(),
        cancelled_on_timeout,
        duration_secs: started.elapsed().as_secs_f64(),
    })
}

fn register_resources(scheduler: &SchedulerRef, config: &AppConfig) {
    for resource in &config.resources {
        for index in 0..resource.count {
            let name = if resource.count == 1 {
                resource.name.clone()
            } else {
                format!("{}-{index}", resource.name)
            };
            let resource_id = scheduler.add_resource(name, resource.capacity.clone());
            log::debug!("Registered resource {resource_id} ({})", resource.name);
        }
    }
}

fn submit_jobs(scheduler: &SchedulerRef, config: &AppConfig) -> Vec<SubmissionRecord> {
    config
        .jobs
        .iter()
        .enumerate()
        .map(|(index, job)| {
            let owner = config.job_owner(job);
            let mut record = SubmissionRecord {
                index,
                owner: owner.to_string(),
                algorithm_id: job.request.algorithm_id.clone(),
                dataset_id: job.request.dataset_id.clone(),
                job_id: None,
                estimated_cost: None,
                error: None,
            };
            match scheduler.submit(owner, job.request.clone()) {
                Ok(response) => {
                    log::info!(
                        "Job #{index} submitted as job {} (estimated cost {:.6})",
                        response.job_id,
                        response.estimated_cost
                    );
                    record.job_id = Some(response.job_id);
                    record.estimated_cost = Some(response.estimated_cost);
                }
                Err(e) => {
                    log::warn!("Job #{index} was rejected: {e}");
                    record.error = Some(e.to_string());
                }
            }
            record
        })
        .collect()
}

/// Submits the configured jobs and waits until all of them finish or the
/// timeout expires. Returns the submissions and the jobs cancelled on timeout.
async fn run_jobs(
    scheduler: &SchedulerRef,
    config: &AppConfig,
) -> crate::Result<(Vec<SubmissionRecord>, Vec<JobId>)> {
    register_resources(scheduler, config);
    let submissions = submit_jobs(scheduler, config);

    let job_ids: Vec<JobId> = submissions.iter().filter_map(|s| s.job_id).collect();
    let mut receivers = Vec::with_capacity(job_ids.len());
    for job_id in &job_ids {
        receivers.push(scheduler.wait_for_job(*job_id)?);
    }
    let wait_all = futures::future::join_all(receivers);

    let timed_out = match config.timeout {
        Some(timeout) => tokio::time::timeout(timeout, wait_all).await.is_err(),
        None => {
            wait_all.await;
            false
        }
    };

    let mut cancelled = Vec::new();
    if timed_out {
        log::warn!("Timeout reached, cancelling unfinished jobs");
        for job_id in job_ids {
            if !scheduler.job_status(job_id)?.status.is_terminal() {
                scheduler.cancel(job_id)?;
                cancelled.push(job_id);
            }
        }
    }
    Ok((submissions, cancelled))
}

/// Sums actual costs per owner, ordered by owner.
pub fn compute_charges(jobs: &[JobDetail]) -> Vec<OwnerCharge> {
    let mut totals: Map<&str, f64> = Map::default();
    for job in jobs {
        if let Some(cost) = job.actual_cost {
            *totals.entry(job.owner.as_str()).or_default() += cost;
        }
    }
    let mut charges: Vec<OwnerCharge> = totals
        .into_iter()
        .map(|(owner, amount)| OwnerCharge {
            owner: owner.to_string(),
            amount: round_cost(amount),
        })
        .collect();
    charges.sort_unstable_by(|a, b| a.owner.cmp(&b.owner));
    charges
}
