use serde::{Deserialize, Serialize};

use crate::internal::common::ids::{JobId, ResourceId};
use crate::services::CollaboratorFuture;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Started {
        job_id: JobId,
        resource_id: ResourceId,
    },
    Completed {
        job_id: JobId,
        actual_cost: f64,
    },
    Failed {
        job_id: JobId,
        error: String,
    },
    Cancelled {
        job_id: JobId,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id } => *job_id,
        }
    }
}

/// Delivers job events to their owners.
///
/// Delivery is fire-and-forget: a failed notification is logged and never
/// changes the state of the job.
pub trait Notifier {
    fn notify(&self, owner: &str, event: &JobEvent) -> CollaboratorFuture;
}
