use crate::internal::common::error::ExecutionError;
use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::server::comm::CommSenderRef;
use crate::internal::server::core::CoreRef;
use crate::internal::server::reactor::{on_job_failed, on_job_finished, release_claim};
use crate::services::TrainOutput;

/// How an execution ended.
#[derive(Debug)]
pub(crate) enum ExecutionOutcome {
    Finished(TrainOutput),
    Failed(ExecutionError),
    /// The job was terminated from outside (cancellation); it is already in its final state.
    Stopped,
}

/// Resource held by a running execution.
///
/// The resource is handed back exactly once: either by `finalize` or, when the
/// execution is dropped before finishing, by `Drop`, which also fails the job.
pub(crate) struct ResourceClaim {
    core_ref: CoreRef,
    comm_ref: CommSenderRef,
    job_id: JobId,
    resource_id: ResourceId,
    finalized: bool,
}

impl ResourceClaim {
    pub fn new(
        core_ref: CoreRef,
        comm_ref: CommSenderRef,
        job_id: JobId,
        resource_id: ResourceId,
    ) -> Self {
        ResourceClaim {
            core_ref,
            comm_ref,
            job_id,
            resource_id,
            finalized: false,
        }
    }

    pub fn finalize(mut self, outcome: ExecutionOutcome, sampled_peak_memory_mb: Option<u64>) {
        self.finalized = true;
        let mut core = self.core_ref.get_mut();
        let mut comm = self.comm_ref.get_mut();
        match outcome {
            ExecutionOutcome::Finished(output) => on_job_finished(
                &mut core,
                &mut *comm,
                self.job_id,
                output,
                sampled_peak_memory_mb,
            ),
            ExecutionOutcome::Failed(error) => on_job_failed(
                &mut core,
                &mut *comm,
                self.job_id,
                error,
                sampled_peak_memory_mb,
            ),
            ExecutionOutcome::Stopped => {
                log::debug!("Execution of job {} stopped", self.job_id);
            }
        }
        release_claim(&mut core, &mut *comm, self.job_id, self.resource_id);
    }
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let (Some(mut core), Some(mut comm)) =
            (self.core_ref.try_get_mut(), self.comm_ref.try_get_mut())
        else {
            log::error!(
                "Execution of job {} ended while the scheduler state was borrowed, resource {} is not released",
                self.job_id,
                self.resource_id
            );
            return;
        };
        let reason = if std::thread::panicking() {
            log::error!("Execution of job {} panicked", self.job_id);
            "Execution panicked"
        } else {
            log::warn!("Execution of job {} was dropped", self.job_id);
            "Execution was interrupted"
        };
        on_job_failed(
            &mut core,
            &mut *comm,
            self.job_id,
            ExecutionError::terminal(reason),
            None,
        );
        release_claim(&mut core, &mut *comm, self.job_id, self.resource_id);
    }
}
