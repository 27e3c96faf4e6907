use crate::internal::common::ids::JobId;
use crate::internal::server::core::CoreRef;
use crate::internal::server::reactor::on_job_progress;

/// Handle given to a trainer for reporting how far it got.
///
/// Reports are percentages; values lower than the current progress are
/// ignored, as are reports after the job has left the running state.
#[derive(Clone)]
pub struct ProgressReporter {
    core_ref: CoreRef,
    job_id: JobId,
}

impl ProgressReporter {
    pub(crate) fn new(core_ref: CoreRef, job_id: JobId) -> Self {
        ProgressReporter { core_ref, job_id }
    }

    #[inline]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn report(&self, percentage: u8) {
        on_job_progress(&mut self.core_ref.get_mut(), self.job_id, percentage);
    }
}
