use std::rc::Rc;

use crate::config::SchedulerConfig;
use crate::internal::common::error::TrainqError;
use crate::internal::common::ids::JobId;
use crate::internal::common::{IdCounter, Map, WrappedRcRefCell};
use crate::internal::scheduler::queue::JobQueue;
use crate::internal::server::job::Job;
use crate::internal::server::pool::ResourcePool;

pub(crate) struct CoreSplitMut<'a> {
    pub jobs: &'a mut Map<JobId, Job>,
    pub queue: &'a mut JobQueue,
    pub pool: &'a mut ResourcePool,
}

/// Scheduler state: jobs, the queue and the resource pool.
pub struct Core {
    jobs: Map<JobId, Job>,
    queue: JobQueue,
    pool: ResourcePool,
    job_id_counter: IdCounter,
    config: Rc<SchedulerConfig>,
}

pub(crate) type CoreRef = WrappedRcRefCell<Core>;

impl CoreRef {
    pub fn new(config: Rc<SchedulerConfig>) -> Self {
        CoreRef::wrap(Core::new(config))
    }
}

impl Core {
    pub fn new(config: Rc<SchedulerConfig>) -> Self {
        Core {
            jobs: Default::default(),
            queue: JobQueue::new(config.dispatch_order),
            pool: Default::default(),
            job_id_counter: Default::default(),
            config,
        }
    }

    #[inline]
    pub fn split_mut(&mut self) -> CoreSplitMut<'_> {
        CoreSplitMut {
            jobs: &mut self.jobs,
            queue: &mut self.queue,
            pool: &mut self.pool,
        }
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Job ids start at 1. Fails once the id space is exhausted.
    pub fn new_job_id(&mut self) -> crate::Result<JobId> {
        let value = u32::try_from(self.job_id_counter.peek() + 1)
            .map_err(|_| TrainqError::GenericError("Job id space is exhausted".to_string()))?;
        self.job_id_counter.next();
        Ok(JobId::new(value))
    }

    #[cfg(test)]
    pub fn skip_job_ids(&mut self, count: u64) {
        self.job_id_counter.skip(count);
    }

    pub fn add_job(&mut self, job: Job) {
        let job_id = job.id;
        assert!(self.jobs.insert(job_id, job).is_none());
    }

    #[inline]
    pub fn find_job(&self, job_id: JobId) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    #[inline]
    pub fn find_job_mut(&mut self, job_id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&job_id)
    }

    pub fn get_job(&self, job_id: JobId) -> crate::Result<&Job> {
        self.jobs
            .get(&job_id)
            .ok_or(TrainqError::UnknownJob(job_id))
    }

    pub fn get_job_mut(&mut self, job_id: JobId) -> crate::Result<&mut Job> {
        self.jobs
            .get_mut(&job_id)
            .ok_or(TrainqError::UnknownJob(job_id))
    }

    #[inline]
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    #[inline]
    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    #[inline]
    pub fn queue_mut(&mut self) -> &mut JobQueue {
        &mut self.queue
    }

    #[inline]
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    #[inline]
    pub fn pool_mut(&mut self) -> &mut ResourcePool {
        &mut self.pool
    }

    /// Checks the cross-structure invariants between jobs, queue and pool.
    #[cfg(test)]
    pub fn sanity_check(&self) {
        use crate::internal::server::job::JobStatus;
        use crate::internal::server::resource::ResourceStatus;

        for job in self.jobs.values() {
            assert_eq!(
                job.status() == JobStatus::Queued,
                self.queue.contains(job.id),
                "Queue entry mismatch for {job:?}"
            );
            assert!(job.progress() <= 100);
            assert_eq!(job.status().is_terminal(), job.completed_at().is_some());
            if job.status() == JobStatus::Running {
                let resource_id = job.resource_id.unwrap();
                let resource = self.pool.get(resource_id).unwrap();
                assert_eq!(resource.current_job(), Some(job.id));
            }
        }
        let mut assigned = crate::internal::common::Set::default();
        for resource in self.pool.iter() {
            assert_eq!(
                resource.status() == ResourceStatus::Busy,
                resource.current_job().is_some()
            );
            if let Some(job_id) = resource.current_job() {
                assert!(assigned.insert(job_id), "Job {job_id} holds two resources");
                assert_eq!(self.jobs[&job_id].status(), JobStatus::Running);
            }
        }
    }
}
