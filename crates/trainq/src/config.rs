//! Application configuration, loaded from a TOML file.
//!
//! ```toml
//! owner = "alice"
//!
//! [scheduler]
//! retry_backoff = "2s"
//! dispatch_order = "priority"
//!
//! [[resources]]
//! name = "node-1"
//! cpu_cores = 8
//! memory_gb = 32
//!
//! [[algorithms]]
//! id = "rf"
//! kind = "random_forest"
//! cost_per_hour = 2.0
//! min_requirements = { cpu_cores = 1, memory_mb = 512 }
//!
//! [[datasets]]
//! id = "iris"
//! rows = 150
//! columns = ["sepal_length", "sepal_width", "species"]
//! target = "species"
//!
//! [[jobs]]
//! algorithm_id = "rf"
//! dataset_id = "iris"
//! train_test_split = 0.8
//! max_runtime_hours = 1
//! memory_limit_mb = 1024
//! cpu_cores = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use trainq_core::config::SchedulerConfig;
use trainq_core::job::JobRequest;
use trainq_core::resources::{ResourceCapacity, ResourceRequirements};
use trainq_core::services::{AlgorithmKind, AlgorithmSpec};
use trainq_core::Set;

use crate::common::error::AppError;

pub const DEFAULT_OWNER: &str = "default";

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Owner of jobs that do not name one.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// Jobs still running after this time are cancelled.
    #[serde(default, deserialize_with = "deserialize_human_duration_opt")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

fn default_owner() -> String {
    DEFAULT_OWNER.to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(default = "default_resource_count")]
    pub count: u32,
    #[serde(flatten)]
    pub capacity: ResourceCapacity,
}

fn default_resource_count() -> u32 {
    1
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct AlgorithmConfig {
    pub id: String,
    pub kind: AlgorithmKind,
    pub cost_per_hour: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub min_requirements: ResourceRequirements,
}

fn default_enabled() -> bool {
    true
}

impl AlgorithmConfig {
    pub fn to_spec(&self) -> AlgorithmSpec {
        AlgorithmSpec {
            id: self.id.clone(),
            kind: self.kind,
            cost_per_hour: self.cost_per_hour,
            enabled: self.enabled,
            min_requirements: self.min_requirements,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub id: String,
    pub rows: u64,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub target: Option<String>,
    /// Owners allowed to train on the dataset. Empty means public.
    #[serde(default)]
    pub allowed_owners: Vec<String>,
    /// Loading a corrupted dataset fails the job without a retry.
    #[serde(default)]
    pub corrupted: bool,
    /// Number of loads that fail with a transient error before the dataset
    /// becomes readable.
    #[serde(default)]
    pub flaky_loads: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct JobConfig {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(flatten)]
    pub request: JobRequest,
}

/// Behavior of the simulated trainers.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    /// Time spent on a single training step.
    #[serde(deserialize_with = "deserialize_human_duration")]
    pub step_duration: Duration,
    /// Default number of steps, a job may override it with the `steps` parameter.
    pub steps: u32,
    /// Probability that an attempt fails with a transient error.
    pub transient_failure_rate: f64,
    /// Algorithm kinds that get a trainer. Empty means all kinds.
    pub kinds: Vec<AlgorithmKind>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            step_duration: Duration::from_millis(200),
            steps: 5,
            transient_failure_rate: 0.0,
            kinds: Vec::new(),
        }
    }
}

fn deserialize_human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let buf = String::deserialize(deserializer)?;
    humantime::parse_duration(&buf).map_err(serde::de::Error::custom)
}

fn deserialize_human_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_human_duration(deserializer).map(Some)
}

impl AppConfig {
    pub fn parse(content: &str) -> crate::Result<AppConfig> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks things that serde cannot: references between tables, duplicate ids
    /// and value ranges.
    pub fn validate(&self) -> crate::Result<()> {
        self.scheduler.validate()?;

        if !(0.0..=1.0).contains(&self.trainer.transient_failure_rate) {
            return Err(config_error(format!(
                "transient_failure_rate {} is outside of [0, 1]",
                self.trainer.transient_failure_rate
            )));
        }
        if self.trainer.steps == 0 {
            return Err(config_error("Trainer needs at least one step".to_string()));
        }

        let mut resource_names: Set<&str> = Set::default();
        for resource in &self.resources {
            if resource.count == 0 {
                return Err(config_error(format!(
                    "Resource '{}' has zero count",
                    resource.name
                )));
            }
            if !resource_names.insert(resource.name.as_str()) {
                return Err(config_error(format!(
                    "Resource '{}' is defined more than once",
                    resource.name
                )));
            }
        }

        let mut algorithms: Set<&str> = Set::default();
        for algorithm in &self.algorithms {
            if !algorithm.cost_per_hour.is_finite() || algorithm.cost_per_hour < 0.0 {
                return Err(config_error(format!(
                    "Algorithm '{}' has invalid cost {}",
                    algorithm.id, algorithm.cost_per_hour
                )));
            }
            if !algorithms.insert(algorithm.id.as_str()) {
                return Err(config_error(format!(
                    "Algorithm '{}' is defined more than once",
                    algorithm.id
                )));
            }
        }

        let mut datasets: Set<&str> = Set::default();
        for dataset in &self.datasets {
            if !datasets.insert(dataset.id.as_str()) {
                return Err(config_error(format!(
                    "Dataset '{}' is defined more than once",
                    dataset.id
                )));
            }
            if let Some(target) = &dataset.target {
                if !dataset.columns.is_empty() && !dataset.columns.contains(target) {
                    return Err(config_error(format!(
                        "Target '{target}' of dataset '{}' is not one of its columns",
                        dataset.id
                    )));
                }
            }
        }

        // Jobs referencing unknown algorithms or datasets are left to admission,
        // so that the run report shows how they are rejected.
        for (index, job) in self.jobs.iter().enumerate() {
            if job.owner.as_deref().is_some_and(str::is_empty) {
                return Err(config_error(format!("Job #{index} has an empty owner")));
            }
        }
        Ok(())
    }

    pub fn job_owner<'a>(&'a self, job: &'a JobConfig) -> &'a str {
        job.owner.as_deref().unwrap_or(&self.owner)
    }

    pub fn total_resource_count(&self) -> u32 {
        self.resources.iter().map(|r| r.count).sum()
    }
}

fn config_error(message: String) -> AppError {
    AppError::ConfigError(message)
}

pub fn load_config(path: &Path) -> crate::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    log::debug!("Loading configuration from {}", path.display());
    AppConfig::parse(&content)
}
