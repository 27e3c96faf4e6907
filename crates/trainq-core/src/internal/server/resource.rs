use std::fmt;

use serde::{Deserialize, Serialize};

use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::common::resources::ResourceCapacity;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Available,
    Busy,
    Maintenance,
    Offline,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceStatus::Available => "available",
            ResourceStatus::Busy => "busy",
            ResourceStatus::Maintenance => "maintenance",
            ResourceStatus::Offline => "offline",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResourceStats {
    pub jobs_completed: u64,
    pub total_runtime_seconds: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub resource_id: ResourceId,
    pub name: String,
    pub capacity: ResourceCapacity,
    pub status: ResourceStatus,
    pub current_job: Option<JobId>,
    pub stats: ResourceStats,
}

pub struct ComputeResource {
    pub id: ResourceId,
    pub name: String,
    pub capacity: ResourceCapacity,
    status: ResourceStatus,
    current_job: Option<JobId>,
    stats: ResourceStats,
}

impl fmt::Debug for ComputeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeResource")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("current_job", &self.current_job)
            .finish()
    }
}

impl ComputeResource {
    pub fn new(id: ResourceId, name: String, capacity: ResourceCapacity) -> Self {
        ComputeResource {
            id,
            name,
            capacity,
            status: ResourceStatus::Available,
            current_job: None,
            stats: Default::default(),
        }
    }

    #[inline]
    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    #[inline]
    pub fn current_job(&self) -> Option<JobId> {
        self.current_job
    }

    #[inline]
    pub fn stats(&self) -> &ResourceStats {
        &self.stats
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.status == ResourceStatus::Available
    }

    pub(crate) fn claim(&mut self, job_id: JobId) {
        assert!(
            self.is_available() && self.current_job.is_none(),
            "Claiming resource {} in state {}",
            self.id,
            self.status
        );
        self.status = ResourceStatus::Busy;
        self.current_job = Some(job_id);
    }

    /// Frees the resource if it is still assigned to `job_id`.
    pub(crate) fn release(&mut self, job_id: JobId, completed_runtime: Option<f64>) -> bool {
        if self.current_job != Some(job_id) {
            return false;
        }
        debug_assert_eq!(self.status, ResourceStatus::Busy);
        self.status = ResourceStatus::Available;
        self.current_job = None;
        if let Some(runtime) = completed_runtime {
            self.stats.jobs_completed += 1;
            self.stats.total_runtime_seconds += runtime;
        }
        true
    }

    pub(crate) fn set_idle_status(&mut self, status: ResourceStatus) {
        assert!(self.current_job.is_none() && status != ResourceStatus::Busy);
        self.status = status;
    }

    pub fn info(&self) -> ResourceInfo {
        ResourceInfo {
            resource_id: self.id,
            name: self.name.clone(),
            capacity: self.capacity.clone(),
            status: self.status,
            current_job: self.current_job,
            stats: self.stats.clone(),
        }
    }
}
