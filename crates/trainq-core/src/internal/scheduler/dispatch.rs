use std::rc::Rc;
use std::time::Duration;

use tokio::sync::{Notify, oneshot};
use tokio::time::{Interval, MissedTickBehavior};

use crate::events::JobEvent;
use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::executor::{ExecutionContext, run_job};
use crate::internal::server::comm::{Comm, WorkItem};
use crate::internal::server::core::Core;
use crate::internal::server::job::{JobStatus, StopReason};

/// A job that was matched with a resource and is ready to be executed.
#[derive(Debug)]
pub(crate) struct Dispatch {
    pub job_id: JobId,
    pub resource_id: ResourceId,
    pub stop_receiver: oneshot::Receiver<StopReason>,
}

/// Claims a resource for a queued job. Claim, dequeue and the switch to
/// running happen under one mutable borrow of the core, so two passes can
/// never dispatch the same job or hand out the same resource twice.
fn try_dispatch(core: &mut Core, comm: &mut impl Comm, job_id: JobId) -> Option<Dispatch> {
    let split = core.split_mut();
    let job = split.jobs.get_mut(&job_id)?;
    debug_assert_eq!(job.status(), JobStatus::Queued);
    let resource_id = split.pool.find_and_claim(&job.requirements, job_id)?;
    split.queue.dequeue(job_id);
    let stop_receiver = match job.set_running(resource_id) {
        Ok(receiver) => receiver,
        Err(error) => {
            log::error!("Cannot start job {job_id}: {error}");
            split.pool.release(resource_id, job_id, None);
            return None;
        }
    };
    log::info!("Job {job_id} dispatched to resource {resource_id}");
    comm.send_work(WorkItem::Notify {
        owner: job.owner.clone(),
        event: JobEvent::Started {
            job_id,
            resource_id,
        },
    });
    Some(Dispatch {
        job_id,
        resource_id,
        stop_receiver,
    })
}

/// One reprocessing pass over the queue.
///
/// By default the pass stops at the first entry that cannot be placed, which
/// keeps strict arrival order. With backfill enabled, entries behind an
/// unplaceable head are tried as well.
pub(crate) fn run_scheduling_now(core: &mut Core, comm: &mut impl Comm) -> Vec<Dispatch> {
    let mut dispatched = Vec::new();
    if core.config().backfill {
        for job_id in core.queue().ordered_job_ids() {
            if !core.pool().iter().any(|r| r.is_available()) {
                break;
            }
            if let Some(dispatch) = try_dispatch(core, comm, job_id) {
                dispatched.push(dispatch);
            }
        }
    } else {
        while let Some(job_id) = core.queue().peek().map(|entry| entry.job_id) {
            match try_dispatch(core, comm, job_id) {
                Some(dispatch) => dispatched.push(dispatch),
                None => {
                    log::debug!("Job {job_id} at the queue head waits for a resource");
                    break;
                }
            }
        }
    }
    dispatched
}

fn create_ticker(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    })
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Reprocessor. Runs a dispatch pass whenever scheduling was requested
/// (a job was admitted or a resource was freed) and periodically as a
/// safety net. Every dispatched job is executed as its own local task.
pub(crate) async fn scheduler_loop(ctx: ExecutionContext, scheduler_wakeup: Rc<Notify>) {
    let mut ticker = create_ticker(ctx.config.reprocess_interval);
    loop {
        tokio::select! {
            _ = scheduler_wakeup.notified() => {
                if !ctx.comm_ref.get().get_scheduling_flag() {
                    continue;
                }
            }
            _ = tick(&mut ticker) => {
                log::trace!("Periodic queue reprocessing");
            }
        }
        let dispatched = {
            let mut comm = ctx.comm_ref.get_mut();
            let mut core = ctx.core_ref.get_mut();
            comm.reset_scheduling_flag();
            run_scheduling_now(&mut core, &mut *comm)
        };
        for dispatch in dispatched {
            tokio::task::spawn_local(run_job(ctx.clone(), dispatch));
        }
    }
}
