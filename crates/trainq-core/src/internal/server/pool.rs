use std::collections::BTreeMap;

use crate::internal::common::error::TrainqError;
use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::common::resources::{ResourceCapacity, ResourceRequirements};
use crate::internal::server::resource::{ComputeResource, ResourceStatus};

/// Owns every compute resource. All changes of resource status go through here.
///
/// Resources are kept ordered by id, i.e. in registration order, which is the
/// order in which first-fit matching visits them.
#[derive(Default, Debug)]
pub struct ResourcePool {
    resources: BTreeMap<ResourceId, ComputeResource>,
    id_counter: u32,
}

impl ResourcePool {
    pub fn add(&mut self, name: String, capacity: ResourceCapacity) -> ResourceId {
        self.id_counter += 1;
        let resource_id = ResourceId::new(self.id_counter);
        log::debug!("New resource {resource_id} ({name}): {capacity:?}");
        self.resources
            .insert(resource_id, ComputeResource::new(resource_id, name, capacity));
        resource_id
    }

    #[inline]
    pub fn get(&self, resource_id: ResourceId) -> Option<&ComputeResource> {
        self.resources.get(&resource_id)
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ComputeResource> {
        self.resources.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Number of resources currently holding a job.
    pub fn busy_count(&self) -> usize {
        self.resources
            .values()
            .filter(|r| r.current_job().is_some())
            .count()
    }

    /// Finds the first available resource able to hold `requirements` and claims
    /// it for `job_id` in the same step.
    pub fn find_and_claim(
        &mut self,
        requirements: &ResourceRequirements,
        job_id: JobId,
    ) -> Option<ResourceId> {
        let resource = self
            .resources
            .values_mut()
            .find(|r| r.is_available() && r.capacity.satisfies(requirements))?;
        resource.claim(job_id);
        log::debug!("Resource {} claimed by job {}", resource.id, job_id);
        Some(resource.id)
    }

    /// Returns the resource to the pool if it is still held by `job_id`.
    /// `completed_runtime` is set when the job finished successfully.
    pub fn release(
        &mut self,
        resource_id: ResourceId,
        job_id: JobId,
        completed_runtime: Option<f64>,
    ) -> bool {
        let Some(resource) = self.resources.get_mut(&resource_id) else {
            log::error!("Releasing unknown resource {resource_id}");
            return false;
        };
        let released = resource.release(job_id, completed_runtime);
        if released {
            log::debug!("Resource {resource_id} released by job {job_id}");
        } else {
            log::debug!("Resource {resource_id} is no longer held by job {job_id}");
        }
        released
    }

    /// Moves an idle resource into maintenance/offline or back to available.
    /// Busy resources are rejected, the busy/available switch belongs to claim and release.
    pub fn set_status(
        &mut self,
        resource_id: ResourceId,
        status: ResourceStatus,
    ) -> crate::Result<()> {
        let resource = self
            .resources
            .get_mut(&resource_id)
            .ok_or(TrainqError::UnknownResource(resource_id))?;
        if resource.current_job().is_some() {
            return Err(TrainqError::ResourceBusy(resource_id));
        }
        if status == ResourceStatus::Busy {
            return Err(TrainqError::validation(
                "Resources become busy only by being claimed",
            ));
        }
        log::debug!("Resource {resource_id}: {} -> {status}", resource.status());
        resource.set_idle_status(status);
        Ok(())
    }

    /// Whether some registered resource could hold the requirements, regardless
    /// of its current status.
    pub fn could_ever_satisfy(&self, requirements: &ResourceRequirements) -> bool {
        self.resources
            .values()
            .any(|r| r.capacity.satisfies(requirements))
    }

    pub fn has_available_match(&self, requirements: &ResourceRequirements) -> bool {
        self.resources
            .values()
            .any(|r| r.is_available() && r.capacity.satisfies(requirements))
    }
}
