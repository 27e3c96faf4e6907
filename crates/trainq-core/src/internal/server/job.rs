use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::internal::common::Map;
use crate::internal::common::error::TrainqError;
use crate::internal::common::ids::{DatasetId, JobId, OwnerId, ResourceId};
use crate::internal::common::resources::ResourceRequirements;
use crate::services::{AlgorithmSpec, ArtifactRef};

pub type JobParameters = Map<String, serde_json::Value>;
pub type JobMetrics = Map<String, f64>;

pub const PROGRESS_DONE: u8 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Created, JobStatus::Queued)
                | (JobStatus::Created, JobStatus::Cancelled)
                | (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    #[inline]
    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Why a running execution is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancel,
}

/// A job submission, as received from a client.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobRequest {
    pub algorithm_id: String,
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub parameters: JobParameters,
    pub train_test_split: f64,
    #[serde(default)]
    pub random_seed: u64,
    pub max_runtime_hours: u32,
    pub memory_limit_mb: u64,
    pub cpu_cores: u32,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default)]
    pub priority: Priority,
}

impl JobRequest {
    #[inline]
    pub fn requirements(&self) -> ResourceRequirements {
        ResourceRequirements::new(self.cpu_cores, self.memory_limit_mb, self.use_gpu)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub estimated_cost: f64,
}

/// Result of a status query.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub progress_percentage: u8,
    pub logs: Vec<String>,
    pub metrics: JobMetrics,
    pub error: Option<String>,
}

/// Full job record, used for reports.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JobDetail {
    pub job_id: JobId,
    pub owner: OwnerId,
    pub algorithm_id: String,
    pub dataset_id: DatasetId,
    pub priority: Priority,
    pub requirements: ResourceRequirements,
    pub status: JobStatus,
    pub progress_percentage: u8,
    pub resource_id: Option<ResourceId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifact: Option<ArtifactRef>,
    pub metrics: JobMetrics,
    pub error: Option<String>,
    pub estimated_cost: f64,
    pub actual_cost: Option<f64>,
    pub runtime_seconds: Option<f64>,
    /// Reported by the trainer, or sampled from the process RSS when the job
    /// was the only one running. Unset when neither is available.
    pub peak_memory_mb: Option<u64>,
    pub retries: u32,
}

/// Rounds a cost to a fixed number of decimal places.
pub fn round_cost(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

pub fn compute_actual_cost(cost_per_hour: f64, runtime_seconds: f64) -> f64 {
    round_cost(cost_per_hour * (runtime_seconds / 3600.0))
}

pub fn compute_estimated_cost(cost_per_hour: f64, max_runtime_hours: u32) -> f64 {
    round_cost(cost_per_hour * max_runtime_hours as f64)
}

pub struct Job {
    pub id: JobId,
    pub owner: OwnerId,
    pub algorithm: Rc<AlgorithmSpec>,
    pub parameters: JobParameters,
    pub dataset_id: DatasetId,
    pub train_test_split: f64,
    pub random_seed: u64,
    pub max_runtime_hours: u32,
    pub requirements: ResourceRequirements,
    pub priority: Priority,

    status: JobStatus,
    progress: u8,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    started_instant: Option<tokio::time::Instant>,

    pub resource_id: Option<ResourceId>,
    pub artifact: Option<ArtifactRef>,
    pub metrics: JobMetrics,
    pub error: Option<String>,
    pub estimated_cost: f64,
    pub actual_cost: Option<f64>,
    pub runtime_seconds: Option<f64>,
    pub peak_memory_mb: Option<u64>,
    pub retries: u32,

    logs: Vec<String>,

    stop_sender: Option<oneshot::Sender<StopReason>>,
    /// Fired once when the job reaches a terminal state.
    completion_callbacks: Vec<oneshot::Sender<JobStatus>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("status", &self.status)
            .finish()
    }
}

impl Job {
    pub fn new(
        id: JobId,
        owner: OwnerId,
        algorithm: Rc<AlgorithmSpec>,
        request: JobRequest,
    ) -> Self {
        let requirements = request.requirements();
        let estimated_cost = compute_estimated_cost(algorithm.cost_per_hour, request.max_runtime_hours);
        log::debug!("New job {} {:?}", id, requirements);
        let mut job = Job {
            id,
            owner,
            algorithm,
            parameters: request.parameters,
            dataset_id: request.dataset_id,
            train_test_split: request.train_test_split,
            random_seed: request.random_seed,
            max_runtime_hours: request.max_runtime_hours,
            requirements,
            priority: request.priority,
            status: JobStatus::Created,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            started_instant: None,
            resource_id: None,
            artifact: None,
            metrics: Default::default(),
            error: None,
            estimated_cost,
            actual_cost: None,
            runtime_seconds: None,
            peak_memory_mb: None,
            retries: 0,
            logs: Vec::new(),
            stop_sender: None,
            completion_callbacks: Vec::new(),
        };
        job.add_log(format!(
            "Job created; estimated cost {:.4}",
            job.estimated_cost
        ));
        job
    }

    #[inline]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    #[inline]
    pub fn progress(&self) -> u8 {
        self.progress
    }

    #[inline]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[inline]
    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    pub fn add_log<S: AsRef<str>>(&mut self, message: S) {
        self.logs.push(format!(
            "{} {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            message.as_ref()
        ));
    }

    /// Moves the job into a new state. Transitions that are not allowed by the
    /// lifecycle (in particular anything out of a terminal state) are rejected.
    pub fn transition(&mut self, to: JobStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(TrainqError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to,
            });
        }
        log::debug!("Job {} transition {} -> {}", self.id, self.status, to);
        self.status = to;
        if to.is_terminal() {
            assert!(self.completed_at.is_none());
            self.completed_at = Some(Utc::now());
            self.stop_sender = None;
            for callback in self.completion_callbacks.drain(..) {
                callback.send(to).ok();
            }
        }
        Ok(())
    }

    /// Marks the job as running on the given resource and returns the receiving
    /// side of the cooperative stop signal.
    pub(crate) fn set_running(
        &mut self,
        resource_id: ResourceId,
    ) -> crate::Result<oneshot::Receiver<StopReason>> {
        self.transition(JobStatus::Running)?;
        let (sender, receiver) = oneshot::channel();
        self.stop_sender = Some(sender);
        self.resource_id = Some(resource_id);
        self.started_at = Some(Utc::now());
        self.started_instant = Some(tokio::time::Instant::now());
        self.add_log(format!("Dispatched to resource {resource_id}"));
        Ok(receiver)
    }

    /// Sends the stop signal to the execution owning this job, if any.
    pub(crate) fn send_stop(&mut self, reason: StopReason) {
        if let Some(sender) = self.stop_sender.take() {
            sender.send(reason).ok();
        }
    }

    /// Progress only moves forward and only while the job is running.
    pub fn set_progress(&mut self, percentage: u8) -> bool {
        let percentage = percentage.min(PROGRESS_DONE);
        if self.status != JobStatus::Running || percentage <= self.progress {
            return false;
        }
        self.progress = percentage;
        true
    }

    /// Time the job has spent on its resource so far.
    pub fn elapsed_runtime(&self) -> Option<Duration> {
        self.started_instant.map(|instant| instant.elapsed())
    }

    /// Records runtime and actual cost from the time spent on the resource.
    pub(crate) fn account_runtime(&mut self) -> Option<f64> {
        let runtime = self.elapsed_runtime()?.as_secs_f64();
        let cost = compute_actual_cost(self.algorithm.cost_per_hour, runtime);
        self.runtime_seconds = Some(runtime);
        self.actual_cost = Some(cost);
        Some(cost)
    }

    pub fn subscribe_to_completion(&mut self) -> oneshot::Receiver<JobStatus> {
        let (tx, rx) = oneshot::channel();
        if self.status.is_terminal() {
            tx.send(self.status).ok();
        } else {
            self.completion_callbacks.push(tx);
        }
        rx
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            status: self.status,
            progress_percentage: self.progress,
            logs: self.logs.clone(),
            metrics: self.metrics.clone(),
            error: self.error.clone(),
        }
    }

    pub fn detail(&self) -> JobDetail {
        JobDetail {
            job_id: self.id,
            owner: self.owner.clone(),
            algorithm_id: self.algorithm.id.clone(),
            dataset_id: self.dataset_id.clone(),
            priority: self.priority,
            requirements: self.requirements,
            status: self.status,
            progress_percentage: self.progress,
            resource_id: self.resource_id,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            artifact: self.artifact.clone(),
            metrics: self.metrics.clone(),
            error: self.error.clone(),
            estimated_cost: self.estimated_cost,
            actual_cost: self.actual_cost,
            runtime_seconds: self.runtime_seconds,
            peak_memory_mb: self.peak_memory_mb,
            retries: self.retries,
        }
    }
}
