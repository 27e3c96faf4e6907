use std::rc::Rc;

use crate::internal::common::error::TrainqError;
use crate::internal::server::comm::Comm;
use crate::internal::server::core::Core;
use crate::internal::server::job::{Job, JobRequest, SubmitResponse};
use crate::internal::server::reactor::on_new_job;
use crate::services::Services;

pub const MIN_TRAIN_TEST_SPLIT: f64 = 0.1;
pub const MAX_TRAIN_TEST_SPLIT: f64 = 0.9;

fn validate_request(request: &JobRequest) -> crate::Result<()> {
    if request.algorithm_id.is_empty() {
        return Err(TrainqError::validation("Algorithm id is empty"));
    }
    if request.dataset_id.is_empty() {
        return Err(TrainqError::validation("Dataset id is empty"));
    }
    let split = request.train_test_split;
    if !split.is_finite() || !(MIN_TRAIN_TEST_SPLIT..=MAX_TRAIN_TEST_SPLIT).contains(&split) {
        return Err(TrainqError::validation(format!(
            "Train/test split {split} is outside of [{MIN_TRAIN_TEST_SPLIT}, {MAX_TRAIN_TEST_SPLIT}]"
        )));
    }
    if request.max_runtime_hours == 0 {
        return Err(TrainqError::validation(
            "Maximal runtime has to be at least one hour",
        ));
    }
    if request.cpu_cores == 0 {
        return Err(TrainqError::validation("At least one CPU core has to be requested"));
    }
    if request.memory_limit_mb == 0 {
        return Err(TrainqError::validation("Memory limit has to be positive"));
    }
    Ok(())
}

/// Validates a submission, creates the job and enqueues it.
///
/// All checks are done before anything is created, so a rejected request
/// leaves no trace in the scheduler.
pub(crate) fn admit_job(
    core: &mut Core,
    comm: &mut impl Comm,
    services: &Services,
    owner: &str,
    request: JobRequest,
) -> crate::Result<SubmitResponse> {
    validate_request(&request)?;

    let spec = services
        .algorithms
        .lookup(&request.algorithm_id)
        .ok_or_else(|| {
            TrainqError::validation(format!("Unknown algorithm '{}'", request.algorithm_id))
        })?;
    if !spec.enabled {
        return Err(TrainqError::access(format!(
            "Algorithm '{}' is disabled",
            spec.id
        )));
    }
    services
        .access
        .check_dataset_access(owner, &request.dataset_id)
        .map_err(TrainqError::AccessError)?;

    let requirements = request.requirements();
    if !requirements.covers(&spec.min_requirements) {
        return Err(TrainqError::validation(format!(
            "Requested resources {requirements:?} are below the minimum of '{}': {:?}",
            spec.id, spec.min_requirements
        )));
    }
    if core.config().reject_unsatisfiable && !core.pool().could_ever_satisfy(&requirements) {
        return Err(TrainqError::validation(format!(
            "No registered resource can provide {requirements:?}"
        )));
    }

    let job_id = core.new_job_id()?;
    let job = Job::new(job_id, owner.to_string(), Rc::new(spec), request);
    let estimated_cost = job.estimated_cost;
    log::info!("Job {job_id} admitted for '{owner}', estimated cost {estimated_cost:.4}");
    on_new_job(core, comm, job);
    Ok(SubmitResponse {
        job_id,
        estimated_cost,
    })
}
