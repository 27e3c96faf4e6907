use thiserror::Error;

use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::server::job::JobStatus;

#[allow(clippy::enum_variant_names)]
#[derive(Debug, Error)]
pub enum TrainqError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Access denied: {0}")]
    AccessError(String),
    #[error("Job {job_id} is not cancellable (status: {status})")]
    NotCancellable { job_id: JobId, status: JobStatus },
    #[error("Invalid transition of job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("Unknown job {0}")]
    UnknownJob(JobId),
    #[error("Unknown resource {0}")]
    UnknownResource(ResourceId),
    #[error("Resource {0} is busy")]
    ResourceBusy(ResourceId),
    #[error("Error: {0}")]
    GenericError(String),
}

impl TrainqError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn access<S: Into<String>>(message: S) -> Self {
        Self::AccessError(message.into())
    }
}

impl From<String> for TrainqError {
    fn from(e: String) -> Self {
        Self::GenericError(e)
    }
}

impl From<&str> for TrainqError {
    fn from(e: &str) -> Self {
        Self::GenericError(e.to_string())
    }
}

/// Error produced while a job is being executed on a claimed resource.
/// It is never returned to the submitter; it is recorded on the job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// Infrastructure or I/O hiccup, the attempt may be repeated.
    #[error("{0}")]
    Transient(String),
    /// Bad data, unsupported algorithm, resource exhaustion, ...
    #[error("{0}")]
    Terminal(String),
}

impl ExecutionError {
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient(message.into())
    }

    pub fn terminal<S: Into<String>>(message: S) -> Self {
        Self::Terminal(message.into())
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecutionError::Transient(_))
    }
}
