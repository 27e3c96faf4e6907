use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep, sleep_until};

use crate::internal::common::error::ExecutionError;
use crate::internal::common::ids::{DatasetId, JobId};
use crate::internal::executor::ExecutionContext;
use crate::internal::executor::claim::{ExecutionOutcome, ResourceClaim};
use crate::internal::executor::memory::MemorySampler;
use crate::internal::executor::progress::ProgressReporter;
use crate::internal::scheduler::Dispatch;
use crate::internal::server::job::{JobParameters, JobStatus, StopReason};
use crate::internal::server::reactor::{on_job_progress, on_job_retry};
use crate::services::{AlgorithmSpec, TrainContext, TrainOutput};

pub(crate) const PROGRESS_DATASET_LOADED: u8 = 20;
pub(crate) const PROGRESS_TRAINING_STARTED: u8 = 40;
pub(crate) const PROGRESS_TRAINING_FINISHED: u8 = 80;

const SECONDS_PER_HOUR: u64 = 3600;

/// Immutable copy of what the attempts need, taken once at start.
struct JobInputs {
    spec: Rc<AlgorithmSpec>,
    dataset_id: DatasetId,
    parameters: JobParameters,
    train_test_split: f64,
    random_seed: u64,
    max_runtime_hours: u32,
}

enum Supervised<T> {
    Done(T),
    Stopped(Option<StopReason>),
    TimeLimitReached,
}

/// Polls `future` until it finishes, the job is stopped from outside, or
/// the deadline passes. Memory is sampled in the meantime.
async fn supervise<F: Future>(
    future: F,
    stop_receiver: &mut oneshot::Receiver<StopReason>,
    sampler: &mut MemorySampler,
    deadline: Option<Instant>,
) -> Supervised<F::Output> {
    tokio::pin!(future);
    let time_limit = async {
        match deadline {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(time_limit);
    loop {
        tokio::select! {
            biased;
            reason = &mut *stop_receiver => {
                return Supervised::Stopped(reason.ok());
            }
            _ = &mut time_limit => {
                return Supervised::TimeLimitReached;
            }
            output = &mut future => {
                return Supervised::Done(output);
            }
            _ = sampler.tick() => {}
        }
    }
}

async fn run_attempt(
    ctx: &ExecutionContext,
    job_id: JobId,
    inputs: &JobInputs,
    attempt: u32,
) -> Result<TrainOutput, ExecutionError> {
    let kind = inputs.spec.kind;
    let trainer = ctx
        .services
        .trainers
        .get(kind)
        .ok_or_else(|| ExecutionError::terminal(format!("Unsupported algorithm kind '{kind}'")))?;

    let dataset = ctx.services.datasets.load(&inputs.dataset_id).await?;
    on_job_progress(
        &mut ctx.core_ref.get_mut(),
        job_id,
        PROGRESS_DATASET_LOADED,
    );

    let train_ctx = TrainContext {
        job_id,
        spec: inputs.spec.clone(),
        dataset,
        parameters: inputs.parameters.clone(),
        train_test_split: inputs.train_test_split,
        random_seed: inputs.random_seed,
        attempt,
        progress: ProgressReporter::new(ctx.core_ref.clone(), job_id),
    };
    on_job_progress(
        &mut ctx.core_ref.get_mut(),
        job_id,
        PROGRESS_TRAINING_STARTED,
    );
    let output = trainer.fit_and_evaluate(train_ctx).await?;
    on_job_progress(
        &mut ctx.core_ref.get_mut(),
        job_id,
        PROGRESS_TRAINING_FINISHED,
    );
    Ok(output)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

async fn execute(
    ctx: &ExecutionContext,
    job_id: JobId,
    inputs: &JobInputs,
    stop_receiver: &mut oneshot::Receiver<StopReason>,
    sampler: &mut MemorySampler,
) -> ExecutionOutcome {
    let deadline = ctx.config.enforce_time_limit.then(|| {
        Instant::now() + Duration::from_secs(inputs.max_runtime_hours as u64 * SECONDS_PER_HOUR)
    });
    let mut retries = 0;
    loop {
        // A panic in the trainer or the dataset store fails the job
        let attempt =
            AssertUnwindSafe(run_attempt(ctx, job_id, inputs, retries + 1)).catch_unwind();
        let error = match supervise(attempt, stop_receiver, sampler, deadline).await {
            Supervised::Done(Ok(Ok(output))) => return ExecutionOutcome::Finished(output),
            Supervised::Done(Ok(Err(error))) => error,
            Supervised::Done(Err(payload)) => {
                let message = panic_message(&*payload);
                log::error!("Execution of job {job_id} panicked: {message}");
                return ExecutionOutcome::Failed(ExecutionError::terminal(format!(
                    "Trainer panicked: {message}"
                )));
            }
            Supervised::Stopped(reason) => {
                log::debug!("Job {job_id} stopped ({reason:?})");
                return ExecutionOutcome::Stopped;
            }
            Supervised::TimeLimitReached => {
                return ExecutionOutcome::Failed(ExecutionError::terminal("Time limit reached"));
            }
        };
        if !error.is_transient() || retries >= ctx.config.transient_retry_limit {
            return ExecutionOutcome::Failed(error);
        }
        retries += 1;
        on_job_retry(&mut ctx.core_ref.get_mut(), job_id, &error);
        match supervise(
            sleep(ctx.config.retry_backoff),
            stop_receiver,
            sampler,
            deadline,
        )
        .await
        {
            Supervised::Done(()) => {}
            Supervised::Stopped(_) => return ExecutionOutcome::Stopped,
            Supervised::TimeLimitReached => {
                return ExecutionOutcome::Failed(ExecutionError::terminal("Time limit reached"));
            }
        }
    }
}

/// Runs a dispatched job on its claimed resource and finalizes it.
pub(crate) async fn run_job(ctx: ExecutionContext, dispatch: Dispatch) {
    let Dispatch {
        job_id,
        resource_id,
        mut stop_receiver,
    } = dispatch;
    let claim = ResourceClaim::new(
        ctx.core_ref.clone(),
        ctx.comm_ref.clone(),
        job_id,
        resource_id,
    );

    let inputs = {
        let core = ctx.core_ref.get();
        match core.find_job(job_id) {
            Some(job) if job.status() == JobStatus::Running => Some(JobInputs {
                spec: job.algorithm.clone(),
                dataset_id: job.dataset_id.clone(),
                parameters: job.parameters.clone(),
                train_test_split: job.train_test_split,
                random_seed: job.random_seed,
                max_runtime_hours: job.max_runtime_hours,
            }),
            _ => None,
        }
    };
    let Some(inputs) = inputs else {
        log::debug!("Job {job_id} is no longer running, nothing to execute");
        claim.finalize(ExecutionOutcome::Stopped, None);
        return;
    };

    log::debug!("Execution of job {job_id} on resource {resource_id} started");
    let mut sampler =
        MemorySampler::new(ctx.config.memory_sample_interval, ctx.core_ref.clone());
    let outcome = execute(&ctx, job_id, &inputs, &mut stop_receiver, &mut sampler).await;
    claim.finalize(outcome, sampler.peak_mb());
}
