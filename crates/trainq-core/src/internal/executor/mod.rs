mod claim;
pub(crate) mod memory;
pub(crate) mod progress;
mod run;

use std::rc::Rc;

use crate::config::SchedulerConfig;
use crate::internal::server::comm::CommSenderRef;
use crate::internal::server::core::CoreRef;
use crate::services::Services;

pub(crate) use run::run_job;

/// Everything an execution needs besides the job itself.
#[derive(Clone)]
pub(crate) struct ExecutionContext {
    pub core_ref: CoreRef,
    pub comm_ref: CommSenderRef,
    pub services: Rc<Services>,
    pub config: Rc<SchedulerConfig>,
}
