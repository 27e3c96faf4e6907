use chrono::{DateTime, TimeDelta, Utc};

use crate::events::JobEvent;
use crate::internal::common::error::{ExecutionError, TrainqError};
use crate::internal::common::ids::{JobId, QueuePosition, ResourceId};
use crate::internal::server::comm::{Comm, WorkItem};
use crate::internal::server::core::Core;
use crate::internal::server::job::{Job, JobStatus, PROGRESS_DONE, StopReason};
use crate::services::TrainOutput;

/// Registers a freshly admitted job and puts it into the queue.
pub(crate) fn on_new_job(core: &mut Core, comm: &mut impl Comm, mut job: Job) -> QueuePosition {
    let job_id = job.id;
    let priority = job.priority;
    job.transition(JobStatus::Queued)
        .expect("A new job has to be in the created state");
    core.add_job(job);

    let estimate = estimate_start(core, job_id);
    let queue = core.queue_mut();
    let position = queue.enqueue(job_id, priority);
    queue.set_estimated_start(job_id, estimate);

    let job = core.find_job_mut(job_id).unwrap();
    job.add_log(format!("Queued at position {position}"));
    log::debug!("Job {job_id} queued at position {position}");

    comm.ask_for_scheduling();
    position
}

/// Earliest moment a fitting resource is expected to be free: now if one is
/// available, otherwise the advisory end of the soonest finishing job on a
/// fitting resource.
fn estimate_start(core: &Core, job_id: JobId) -> Option<DateTime<Utc>> {
    let requirements = core.find_job(job_id)?.requirements;
    if core.pool().has_available_match(&requirements) {
        return Some(Utc::now());
    }
    core.pool()
        .iter()
        .filter(|resource| resource.capacity.satisfies(&requirements))
        .filter_map(|resource| resource.current_job())
        .filter_map(|running_id| {
            let running = core.find_job(running_id)?;
            Some(running.started_at? + TimeDelta::hours(running.max_runtime_hours as i64))
        })
        .min()
}

pub(crate) fn on_job_progress(core: &mut Core, job_id: JobId, percentage: u8) {
    if let Some(job) = core.find_job_mut(job_id) {
        if job.set_progress(percentage) {
            log::debug!("Job {job_id} progress {percentage}%");
            job.add_log(format!("Progress {percentage}%"));
        }
    }
}

pub(crate) fn on_job_retry(core: &mut Core, job_id: JobId, error: &ExecutionError) {
    if let Some(job) = core.find_job_mut(job_id) {
        job.retries += 1;
        log::info!(
            "Job {job_id} failed with a transient error, retrying (retry {}): {error}",
            job.retries
        );
        job.add_log(format!("Transient failure, retry {}: {error}", job.retries));
    }
}

pub(crate) fn on_job_finished(
    core: &mut Core,
    comm: &mut impl Comm,
    job_id: JobId,
    output: TrainOutput,
    sampled_peak_memory_mb: Option<u64>,
) {
    let Some(job) = core.find_job_mut(job_id) else {
        log::error!("Finished job {job_id} is not known");
        return;
    };
    if job.status() != JobStatus::Running {
        log::debug!(
            "Ignoring result of job {job_id}, job is already {}",
            job.status()
        );
        return;
    }
    job.set_progress(PROGRESS_DONE);
    job.artifact = Some(output.artifact);
    job.metrics = output.metrics;
    job.peak_memory_mb = output.peak_memory_mb.or(sampled_peak_memory_mb);
    let actual_cost = job.account_runtime().unwrap_or_default();
    job.transition(JobStatus::Completed)
        .expect("Running job has to be completable");
    job.add_log(format!(
        "Completed in {:.3}s, cost {actual_cost:.4}",
        job.runtime_seconds.unwrap_or_default()
    ));
    log::info!("Job {job_id} completed, cost {actual_cost:.4}");

    let owner = job.owner.clone();
    comm.send_work(WorkItem::RecordCost {
        owner: owner.clone(),
        job_id,
        amount: actual_cost,
    });
    comm.send_work(WorkItem::Notify {
        owner,
        event: JobEvent::Completed {
            job_id,
            actual_cost,
        },
    });
}

pub(crate) fn on_job_failed(
    core: &mut Core,
    comm: &mut impl Comm,
    job_id: JobId,
    error: ExecutionError,
    sampled_peak_memory_mb: Option<u64>,
) {
    let Some(job) = core.find_job_mut(job_id) else {
        log::error!("Failed job {job_id} is not known");
        return;
    };
    if job.status() != JobStatus::Running {
        log::debug!(
            "Ignoring failure of job {job_id}, job is already {}",
            job.status()
        );
        return;
    }
    let message = error.to_string();
    job.error = Some(message.clone());
    job.peak_memory_mb = sampled_peak_memory_mb;
    let actual_cost = job.account_runtime();
    job.transition(JobStatus::Failed)
        .expect("Running job has to be failable");
    job.add_log(format!("Failed: {message}"));
    log::info!("Job {job_id} failed: {message}");

    let owner = job.owner.clone();
    if let Some(amount) = actual_cost {
        comm.send_work(WorkItem::RecordCost {
            owner: owner.clone(),
            job_id,
            amount,
        });
    }
    comm.send_work(WorkItem::Notify {
        owner,
        event: JobEvent::Failed {
            job_id,
            error: message,
        },
    });
}

/// Cancels a job that has not reached a terminal state yet. A queued job loses
/// its queue entry; a running job gets its resource released and its execution
/// receives a stop signal.
pub(crate) fn on_cancel_job(
    core: &mut Core,
    comm: &mut impl Comm,
    job_id: JobId,
) -> crate::Result<()> {
    let split = core.split_mut();
    let job = split
        .jobs
        .get_mut(&job_id)
        .ok_or(TrainqError::UnknownJob(job_id))?;
    let status = job.status();
    if !status.is_cancellable() {
        return Err(TrainqError::NotCancellable { job_id, status });
    }

    let mut actual_cost = None;
    match status {
        JobStatus::Created => {}
        JobStatus::Queued => {
            split.queue.dequeue(job_id);
        }
        JobStatus::Running => {
            job.send_stop(StopReason::Cancel);
            actual_cost = job.account_runtime();
            let resource_id = job.resource_id.expect("Running job without a resource");
            if split.pool.release(resource_id, job_id, None) {
                comm.ask_for_scheduling();
            }
        }
        _ => unreachable!(),
    }
    job.transition(JobStatus::Cancelled)?;
    job.add_log("Cancelled");
    log::info!("Job {job_id} cancelled (was {status})");

    let owner = job.owner.clone();
    if let Some(amount) = actual_cost {
        comm.send_work(WorkItem::RecordCost {
            owner: owner.clone(),
            job_id,
            amount,
        });
    }
    comm.send_work(WorkItem::Notify {
        owner,
        event: JobEvent::Cancelled { job_id },
    });
    Ok(())
}

/// Returns the resource held by an execution back to the pool. Successful
/// runtime is added to the resource statistics. Does nothing when the resource
/// was already taken away from the job (e.g. by cancellation).
pub(crate) fn release_claim(
    core: &mut Core,
    comm: &mut impl Comm,
    job_id: JobId,
    resource_id: ResourceId,
) {
    let completed_runtime = core
        .find_job(job_id)
        .filter(|job| job.status() == JobStatus::Completed)
        .and_then(|job| job.runtime_seconds);
    if core
        .pool_mut()
        .release(resource_id, job_id, completed_runtime)
    {
        comm.ask_for_scheduling();
    }
}
