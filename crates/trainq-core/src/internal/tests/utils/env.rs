use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::LocalSet;

use crate::config::SchedulerConfig;
use crate::control::{SchedulerRef, start_scheduler};
use crate::events::JobEvent;
use crate::internal::common::error::ExecutionError;
use crate::internal::common::ids::{JobId, ResourceId};
use crate::internal::common::resources::ResourceCapacity;
use crate::internal::scheduler::{Dispatch, run_scheduling_now};
use crate::internal::server::admission::admit_job;
use crate::internal::server::comm::{Comm, WorkItem};
use crate::internal::server::core::Core;
use crate::internal::server::job::{Job, JobStatus, SubmitResponse};
use crate::internal::server::reactor::{
    on_cancel_job, on_job_failed, on_job_finished, release_claim,
};
use crate::internal::server::resource::ComputeResource;
use crate::internal::tests::utils::request::JobRequestConfigBuilder;
use crate::internal::tests::utils::services::TestServices;
use crate::services::{ArtifactRef, Services, TrainOutput};

pub const TEST_OWNER: &str = "alice";

#[derive(Default, Debug)]
pub struct TestComm {
    pub need_scheduling: bool,
    pub work: Vec<WorkItem>,
}

impl TestComm {
    pub fn check_need_scheduling(&mut self) {
        assert!(self.need_scheduling);
        self.need_scheduling = false;
    }

    pub fn take_events(&mut self) -> Vec<JobEvent> {
        let (events, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.work)
            .into_iter()
            .partition(|item| matches!(item, WorkItem::Notify { .. }));
        self.work = rest;
        events
            .into_iter()
            .map(|item| match item {
                WorkItem::Notify { event, .. } => event,
                _ => unreachable!(),
            })
            .collect()
    }

    pub fn take_costs(&mut self) -> Vec<(JobId, f64)> {
        let (costs, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.work)
            .into_iter()
            .partition(|item| matches!(item, WorkItem::RecordCost { .. }));
        self.work = rest;
        costs
            .into_iter()
            .map(|item| match item {
                WorkItem::RecordCost { job_id, amount, .. } => (job_id, amount),
                _ => unreachable!(),
            })
            .collect()
    }

    pub fn emptiness_check(&self) {
        assert!(!self.need_scheduling);
        assert!(self.work.is_empty(), "Unexpected work: {:?}", self.work);
    }
}

impl Comm for TestComm {
    fn ask_for_scheduling(&mut self) {
        self.need_scheduling = true;
    }

    fn send_work(&mut self, item: WorkItem) {
        self.work.push(item);
    }
}

pub fn create_test_comm() -> TestComm {
    TestComm::default()
}

pub fn test_output() -> TrainOutput {
    TrainOutput {
        artifact: ArtifactRef("model".to_string()),
        metrics: [("accuracy".to_string(), 0.75)].into_iter().collect(),
        peak_memory_mb: None,
    }
}

/// Drives `Core` synchronously, standing in for the scheduler loop and the
/// executions.
pub struct TestEnv {
    core: Core,
    pub comm: TestComm,
    pub fakes: TestServices,
    services: Services,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(Default::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_services(config, TestServices::default())
    }

    pub fn with_services(config: SchedulerConfig, fakes: TestServices) -> Self {
        let services = fakes.services();
        TestEnv {
            core: Core::new(Rc::new(config)),
            comm: create_test_comm(),
            fakes,
            services,
        }
    }

    pub fn core(&mut self) -> &mut Core {
        &mut self.core
    }

    pub fn new_resource(&mut self, cpu_cores: u32, memory_gb: u32) -> ResourceId {
        let name = format!("node-{}", self.core.pool().len());
        self.core
            .pool_mut()
            .add(name, ResourceCapacity::new(cpu_cores, memory_gb))
    }

    pub fn new_gpu_resource(&mut self, cpu_cores: u32, memory_gb: u32) -> ResourceId {
        let name = format!("gpu-node-{}", self.core.pool().len());
        self.core.pool_mut().add(
            name,
            ResourceCapacity::new(cpu_cores, memory_gb).with_gpus(1, Some("a100".to_string())),
        )
    }

    pub fn submit(&mut self, builder: JobRequestConfigBuilder) -> crate::Result<SubmitResponse> {
        admit_job(
            &mut self.core,
            &mut self.comm,
            &self.services,
            TEST_OWNER,
            builder.build(),
        )
    }

    pub fn submit_ok(&mut self, builder: JobRequestConfigBuilder) -> JobId {
        let response = self.submit(builder).unwrap();
        self.core.sanity_check();
        response.job_id
    }

    pub fn schedule(&mut self) -> Vec<Dispatch> {
        let dispatched = run_scheduling_now(&mut self.core, &mut self.comm);
        self.core.sanity_check();
        dispatched
    }

    pub fn job(&self, job_id: JobId) -> &Job {
        self.core.find_job(job_id).unwrap()
    }

    pub fn job_mut(&mut self, job_id: JobId) -> &mut Job {
        self.core.find_job_mut(job_id).unwrap()
    }

    pub fn status(&self, job_id: JobId) -> JobStatus {
        self.job(job_id).status()
    }

    pub fn resource(&self, resource_id: ResourceId) -> &ComputeResource {
        self.core.pool().get(resource_id).unwrap()
    }

    pub fn cancel(&mut self, job_id: JobId) -> crate::Result<()> {
        let result = on_cancel_job(&mut self.core, &mut self.comm, job_id);
        self.core.sanity_check();
        result
    }

    /// What an execution does when the trainer succeeds.
    pub fn finish(&mut self, job_id: JobId, resource_id: ResourceId) {
        on_job_finished(&mut self.core, &mut self.comm, job_id, test_output(), None);
        release_claim(&mut self.core, &mut self.comm, job_id, resource_id);
        self.core.sanity_check();
    }

    /// What an execution does when the job fails.
    pub fn fail(&mut self, job_id: JobId, resource_id: ResourceId, error: ExecutionError) {
        on_job_failed(&mut self.core, &mut self.comm, job_id, error, None);
        release_claim(&mut self.core, &mut self.comm, job_id, resource_id);
        self.core.sanity_check();
    }
}

/// Default configuration for tests that run the whole scheduler.
pub fn test_config() -> SchedulerConfig {
    SchedulerConfig {
        retry_backoff: Duration::from_secs(5),
        memory_sample_interval: Duration::from_secs(1),
        ..Default::default()
    }
}

/// Starts a scheduler with the fake collaborators and runs `f` against it
/// inside a `LocalSet`. The scheduler is dropped when `f` finishes.
pub async fn run_scheduler_test<F, Fut>(config: SchedulerConfig, fakes: TestServices, f: F)
where
    F: FnOnce(SchedulerRef, TestServices) -> Fut,
    Fut: Future<Output = ()>,
{
    let (scheduler, future) = start_scheduler(config, fakes.services()).unwrap();
    LocalSet::new()
        .run_until(async move {
            tokio::select! {
                _ = future => unreachable!("Scheduler finished"),
                _ = f(scheduler, fakes) => {}
            }
        })
        .await;
}

const WAIT_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

pub async fn wait_for_job(scheduler: &SchedulerRef, job_id: JobId) -> JobStatus {
    let receiver = scheduler.wait_for_job(job_id).unwrap();
    match tokio::time::timeout(WAIT_TIMEOUT, receiver).await {
        Ok(result) => result.unwrap(),
        Err(_) => panic!("Job {job_id} did not finish"),
    }
}

/// Polls until the job reaches `status`.
pub async fn wait_for_status(scheduler: &SchedulerRef, job_id: JobId, status: JobStatus) {
    let wait = async {
        while scheduler.job_status(job_id).unwrap().status != status {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };
    if tokio::time::timeout(WAIT_TIMEOUT, wait).await.is_err() {
        panic!("Job {job_id} did not reach {status}");
    }
}

/// Lets the post-processing loop and spawned notification tasks run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
