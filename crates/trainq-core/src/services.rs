//! Capabilities consumed by the scheduler but implemented elsewhere.
//!
//! The scheduler never fits models, stores datasets, posts ledger entries or
//! delivers notifications itself. It reaches those collaborators through the
//! traits in this module, bundled together in [`Services`].

use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::events::Notifier;
use crate::internal::common::Map;
use crate::internal::common::error::ExecutionError;
use crate::internal::common::ids::{AlgorithmId, DatasetId, JobId};
use crate::internal::common::resources::ResourceRequirements;
use crate::internal::executor::progress::ProgressReporter;
use crate::internal::server::job::{JobMetrics, JobParameters};

/// Closed set of algorithm families the scheduler knows how to route.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    LinearRegression,
    LogisticRegression,
    DecisionTree,
    RandomForest,
    GradientBoosting,
    SupportVectorMachine,
    KMeans,
    NeuralNetwork,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 8] = [
        AlgorithmKind::LinearRegression,
        AlgorithmKind::LogisticRegression,
        AlgorithmKind::DecisionTree,
        AlgorithmKind::RandomForest,
        AlgorithmKind::GradientBoosting,
        AlgorithmKind::SupportVectorMachine,
        AlgorithmKind::KMeans,
        AlgorithmKind::NeuralNetwork,
    ];
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::LinearRegression => "linear_regression",
            AlgorithmKind::LogisticRegression => "logistic_regression",
            AlgorithmKind::DecisionTree => "decision_tree",
            AlgorithmKind::RandomForest => "random_forest",
            AlgorithmKind::GradientBoosting => "gradient_boosting",
            AlgorithmKind::SupportVectorMachine => "support_vector_machine",
            AlgorithmKind::KMeans => "k_means",
            AlgorithmKind::NeuralNetwork => "neural_network",
        };
        f.write_str(name)
    }
}

/// Read-only description of an algorithm offering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AlgorithmSpec {
    pub id: AlgorithmId,
    pub kind: AlgorithmKind,
    pub cost_per_hour: f64,
    pub enabled: bool,
    pub min_requirements: ResourceRequirements,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSchema {
    pub columns: Vec<String>,
    pub target: Option<String>,
}

/// Raw dataset content as returned by a [`DatasetStore`].
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub data: Vec<u8>,
    pub schema: DatasetSchema,
}

/// Reference to a trained model stored by the trainer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct TrainOutput {
    pub artifact: ArtifactRef,
    pub metrics: JobMetrics,
    /// Peak memory measured by the trainer itself, if it tracks it.
    pub peak_memory_mb: Option<u64>,
}

/// Everything a trainer gets for a single attempt.
pub struct TrainContext {
    pub job_id: JobId,
    pub spec: Rc<AlgorithmSpec>,
    pub dataset: Dataset,
    pub parameters: JobParameters,
    pub train_test_split: f64,
    pub random_seed: u64,
    /// Starts at 1 and grows with every retry of the same job.
    pub attempt: u32,
    pub progress: ProgressReporter,
}

pub type TrainFuture = LocalBoxFuture<'static, Result<TrainOutput, ExecutionError>>;
pub type DatasetFuture = LocalBoxFuture<'static, Result<Dataset, ExecutionError>>;
pub type CollaboratorFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

pub trait Trainer {
    /// Fits and evaluates a model. Errors must be classified as transient or terminal.
    fn fit_and_evaluate(&self, ctx: TrainContext) -> TrainFuture;
}

pub trait DatasetStore {
    fn load(&self, dataset_id: &DatasetId) -> DatasetFuture;
}

pub trait BillingLedger {
    fn record_cost(&self, owner: &str, job_id: JobId, amount: f64) -> CollaboratorFuture;
}

pub trait AlgorithmCatalog {
    fn lookup(&self, algorithm_id: &str) -> Option<AlgorithmSpec>;
}

pub trait AccessPolicy {
    /// Returns an explanation when `owner` may not use the dataset.
    fn check_dataset_access(&self, owner: &str, dataset_id: &DatasetId) -> Result<(), String>;
}

/// Trainers bound to algorithm kinds at startup.
#[derive(Default, Clone)]
pub struct TrainerRegistry {
    trainers: Map<AlgorithmKind, Rc<dyn Trainer>>,
}

impl TrainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: AlgorithmKind, trainer: Rc<dyn Trainer>) {
        if self.trainers.insert(kind, trainer).is_some() {
            log::warn!("Trainer for {kind} was replaced");
        }
    }

    pub fn with(mut self, kind: AlgorithmKind, trainer: Rc<dyn Trainer>) -> Self {
        self.register(kind, trainer);
        self
    }

    pub fn get(&self, kind: AlgorithmKind) -> Option<Rc<dyn Trainer>> {
        self.trainers.get(&kind).cloned()
    }
}

pub struct Services {
    pub algorithms: Rc<dyn AlgorithmCatalog>,
    pub access: Rc<dyn AccessPolicy>,
    pub datasets: Rc<dyn DatasetStore>,
    pub trainers: TrainerRegistry,
    pub ledger: Rc<dyn BillingLedger>,
    pub notifier: Rc<dyn Notifier>,
}
