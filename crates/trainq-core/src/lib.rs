#![deny(clippy::await_holding_refcell_ref)]

#[macro_use]
pub(crate) mod internal;

pub mod config;
pub mod control;
pub mod events;
pub mod services;

pub use crate::internal::common::WrappedRcRefCell;
pub use crate::internal::common::error::{ExecutionError, TrainqError};
pub use crate::internal::common::ids::{AlgorithmId, DatasetId, JobId, OwnerId, QueuePosition, ResourceId};
pub use crate::internal::common::{Map, Set};
pub use crate::internal::executor::progress::ProgressReporter;

pub type Error = TrainqError;
pub type Result<T> = std::result::Result<T, Error>;

pub mod job {
    pub use crate::internal::server::job::{
        JobDetail, JobMetrics, JobParameters, JobRequest, JobStatus, JobStatusView, PROGRESS_DONE,
        Priority, SubmitResponse, compute_actual_cost, compute_estimated_cost, round_cost,
    };
    pub use crate::internal::server::admission::{MAX_TRAIN_TEST_SPLIT, MIN_TRAIN_TEST_SPLIT};
}

pub mod resources {
    pub use crate::internal::common::resources::{
        MIB_PER_GIB, ResourceCapacity, ResourceRequirements,
    };
    pub use crate::internal::server::resource::{ResourceInfo, ResourceStats, ResourceStatus};
}

pub mod queue {
    pub use crate::internal::scheduler::queue::QueueEntry;
}
