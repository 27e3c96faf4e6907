//! Public handle for driving the scheduler from the embedding application.

use std::future::Future;
use std::rc::Rc;

use tokio::sync::{Notify, mpsc, oneshot};

use crate::config::SchedulerConfig;
use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::common::resources::ResourceCapacity;
use crate::internal::executor::ExecutionContext;
use crate::internal::scheduler::queue::QueueEntry;
use crate::internal::scheduler::scheduler_loop;
use crate::internal::server::admission::admit_job;
use crate::internal::server::comm::{Comm, CommSenderRef};
use crate::internal::server::core::CoreRef;
use crate::internal::server::job::{JobDetail, JobRequest, JobStatus, JobStatusView, SubmitResponse};
use crate::internal::server::postprocess::work_loop;
use crate::internal::server::reactor::on_cancel_job;
use crate::internal::server::resource::{ResourceInfo, ResourceStatus};
use crate::services::Services;

/// Cloneable handle to a running scheduler. It has to be used from the same
/// thread (and `LocalSet`) the scheduler runs in.
#[derive(Clone)]
pub struct SchedulerRef {
    core_ref: CoreRef,
    comm_ref: CommSenderRef,
    services: Rc<Services>,
}

impl SchedulerRef {
    /// Admits a job. Returns the new job id together with its estimated cost,
    /// or a validation/access error; nothing is created on error.
    pub fn submit(&self, owner: &str, request: JobRequest) -> crate::Result<SubmitResponse> {
        let mut core = self.core_ref.get_mut();
        let mut comm = self.comm_ref.get_mut();
        admit_job(&mut core, &mut *comm, &self.services, owner, request)
    }

    pub fn cancel(&self, job_id: JobId) -> crate::Result<()> {
        let mut core = self.core_ref.get_mut();
        let mut comm = self.comm_ref.get_mut();
        on_cancel_job(&mut core, &mut *comm, job_id)
    }

    pub fn job_status(&self, job_id: JobId) -> crate::Result<JobStatusView> {
        Ok(self.core_ref.get().get_job(job_id)?.status_view())
    }

    pub fn job_detail(&self, job_id: JobId) -> crate::Result<JobDetail> {
        Ok(self.core_ref.get().get_job(job_id)?.detail())
    }

    /// Details of all jobs, ordered by id.
    pub fn jobs(&self) -> Vec<JobDetail> {
        let core = self.core_ref.get();
        let mut jobs: Vec<JobDetail> = core.jobs().map(|job| job.detail()).collect();
        jobs.sort_unstable_by_key(|job| job.job_id);
        jobs
    }

    /// Queue entries in dispatch order.
    pub fn queue_entries(&self) -> Vec<QueueEntry> {
        self.core_ref.get().queue().entries()
    }

    pub fn resources(&self) -> Vec<ResourceInfo> {
        self.core_ref.get().pool().iter().map(|r| r.info()).collect()
    }

    pub fn add_resource(&self, name: impl Into<String>, capacity: ResourceCapacity) -> ResourceId {
        let resource_id = self.core_ref.get_mut().pool_mut().add(name.into(), capacity);
        self.comm_ref.get_mut().ask_for_scheduling();
        resource_id
    }

    /// Puts an idle resource into maintenance/offline or back into service.
    pub fn set_resource_status(
        &self,
        resource_id: ResourceId,
        status: ResourceStatus,
    ) -> crate::Result<()> {
        self.core_ref
            .get_mut()
            .pool_mut()
            .set_status(resource_id, status)?;
        if status == ResourceStatus::Available {
            self.comm_ref.get_mut().ask_for_scheduling();
        }
        Ok(())
    }

    /// Returns a receiver that resolves with the final status of the job.
    pub fn wait_for_job(&self, job_id: JobId) -> crate::Result<oneshot::Receiver<JobStatus>> {
        Ok(self
            .core_ref
            .get_mut()
            .get_job_mut(job_id)?
            .subscribe_to_completion())
    }

    /// Requests a reprocessing pass over the queue.
    pub fn reprocess(&self) {
        self.comm_ref.get_mut().ask_for_scheduling();
    }

    #[cfg(test)]
    pub(crate) fn sanity_check(&self) {
        self.core_ref.get().sanity_check();
    }
}

/// Creates the scheduler. The returned future drives dispatching, execution
/// and post-processing; it has to be polled inside a `tokio::task::LocalSet`
/// and never finishes on its own.
pub fn start_scheduler(
    config: SchedulerConfig,
    services: Services,
) -> crate::Result<(SchedulerRef, impl Future<Output = ()>)> {
    config.validate()?;
    let config = Rc::new(config);
    let services = Rc::new(services);

    let scheduler_wakeup = Rc::new(Notify::new());
    let (work_sender, work_receiver) = mpsc::unbounded_channel();
    let core_ref = CoreRef::new(config.clone());
    let comm_ref = CommSenderRef::new(scheduler_wakeup.clone(), work_sender);

    let ctx = ExecutionContext {
        core_ref: core_ref.clone(),
        comm_ref: comm_ref.clone(),
        services: services.clone(),
        config,
    };
    let future = {
        let services = services.clone();
        async move {
            futures::future::join(
                scheduler_loop(ctx, scheduler_wakeup),
                work_loop(services, work_receiver),
            )
            .await;
        }
    };
    log::debug!("Scheduler created");
    Ok((
        SchedulerRef {
            core_ref,
            comm_ref,
            services,
        },
        future,
    ))
}
