//! In-process collaborators used by the `trainq` binary.
//!
//! Datasets are synthesized from their configuration and trainers only
//! simulate work, so that whole runs can be executed without any external
//! storage or compute service.

use std::cell::Cell;
use std::fmt::Write;
use std::rc::Rc;

use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use trainq_core::events::{JobEvent, Notifier};
use trainq_core::services::{
    AccessPolicy, AlgorithmCatalog, AlgorithmKind, AlgorithmSpec, ArtifactRef, BillingLedger,
    CollaboratorFuture, Dataset, DatasetFuture, DatasetSchema, DatasetStore, Services,
    TrainContext, TrainFuture, TrainOutput, Trainer, TrainerRegistry,
};
use trainq_core::{DatasetId, ExecutionError, JobId, Map};

use crate::config::{AppConfig, DatasetConfig, TrainerConfig};

/// Progress reported once half of the training steps are done.
const PROGRESS_HALFWAY: u8 = 60;

pub struct StaticCatalog {
    specs: Map<String, AlgorithmSpec>,
}

impl StaticCatalog {
    pub fn new(specs: impl IntoIterator<Item = AlgorithmSpec>) -> Self {
        StaticCatalog {
            specs: specs.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

impl AlgorithmCatalog for StaticCatalog {
    fn lookup(&self, algorithm_id: &str) -> Option<AlgorithmSpec> {
        self.specs.get(algorithm_id).cloned()
    }
}

/// Per-dataset list of owners; datasets without a list are public.
pub struct DatasetAcl {
    allowed: Map<DatasetId, Vec<String>>,
}

impl DatasetAcl {
    pub fn new(datasets: &[DatasetConfig]) -> Self {
        DatasetAcl {
            allowed: datasets
                .iter()
                .map(|d| (d.id.clone(), d.allowed_owners.clone()))
                .collect(),
        }
    }
}

impl AccessPolicy for DatasetAcl {
    fn check_dataset_access(&self, owner: &str, dataset_id: &DatasetId) -> Result<(), String> {
        match self.allowed.get(dataset_id) {
            None => Err(format!("Dataset '{dataset_id}' does not exist")),
            Some(owners) if !owners.is_empty() && !owners.iter().any(|o| o == owner) => Err(
                format!("Owner '{owner}' has no access to dataset '{dataset_id}'"),
            ),
            Some(_) => Ok(()),
        }
    }
}

struct StoredDataset {
    config: DatasetConfig,
    remaining_failures: Cell<u32>,
}

/// Serves synthetic CSV content generated from the dataset configuration.
pub struct InMemoryDatasetStore {
    datasets: Map<DatasetId, StoredDataset>,
}

impl InMemoryDatasetStore {
    pub fn new(datasets: &[DatasetConfig]) -> Self {
        InMemoryDatasetStore {
            datasets: datasets
                .iter()
                .map(|d| {
                    (
                        d.id.clone(),
                        StoredDataset {
                            config: d.clone(),
                            remaining_failures: Cell::new(d.flaky_loads),
                        },
                    )
                })
                .collect(),
        }
    }
}

fn dataset_columns(config: &DatasetConfig) -> Vec<String> {
    if !config.columns.is_empty() {
        return config.columns.clone();
    }
    vec![
        "feature_0".to_string(),
        "feature_1".to_string(),
        config.target.clone().unwrap_or_else(|| "target".to_string()),
    ]
}

fn generate_dataset(config: &DatasetConfig) -> Dataset {
    let columns = dataset_columns(config);
    let mut content = columns.join(",");
    content.push('\n');
    for row in 0..config.rows {
        for index in 0..columns.len() {
            if index > 0 {
                content.push(',');
            }
            write!(content, "{}", (row * (index as u64 + 1)) % 97).ok();
        }
        content.push('\n');
    }
    Dataset {
        data: content.into_bytes(),
        schema: DatasetSchema {
            columns,
            target: config.target.clone(),
        },
    }
}

impl DatasetStore for InMemoryDatasetStore {
    fn load(&self, dataset_id: &DatasetId) -> DatasetFuture {
        let result = match self.datasets.get(dataset_id) {
            None => Err(ExecutionError::terminal(format!(
                "Dataset '{dataset_id}' does not exist"
            ))),
            Some(stored) if stored.remaining_failures.get() > 0 => {
                stored
                    .remaining_failures
                    .set(stored.remaining_failures.get() - 1);
                Err(ExecutionError::transient(format!(
                    "Dataset '{dataset_id}' is temporarily unavailable"
                )))
            }
            Some(stored) if stored.config.corrupted => Err(ExecutionError::terminal(format!(
                "Dataset '{dataset_id}' is corrupted"
            ))),
            Some(stored) => Ok(generate_dataset(&stored.config)),
        };
        async move { result }.boxed_local()
    }
}

/// Pretends to fit a model by sleeping through a number of steps.
///
/// Every attempt draws from a generator seeded by the job seed and the attempt
/// number, so runs with the same configuration produce the same metrics.
pub struct SimulatedTrainer {
    config: TrainerConfig,
}

impl SimulatedTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        SimulatedTrainer { config }
    }
}

fn metric_name(kind: AlgorithmKind) -> &'static str {
    match kind {
        AlgorithmKind::LinearRegression | AlgorithmKind::GradientBoosting => "r2",
        AlgorithmKind::KMeans => "silhouette",
        _ => "accuracy",
    }
}

fn round_metric(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl Trainer for SimulatedTrainer {
    fn fit_and_evaluate(&self, ctx: TrainContext) -> TrainFuture {
        let attempt = ctx.attempt;
        let steps = ctx
            .parameters
            .get("steps")
            .and_then(|v| v.as_u64())
            .map(|steps| steps.clamp(1, u32::MAX as u64) as u32)
            .unwrap_or(self.config.steps);
        let step_duration = self.config.step_duration;
        let failure_rate = self.config.transient_failure_rate;

        async move {
            let mut rng = StdRng::seed_from_u64(ctx.random_seed.wrapping_add(attempt as u64));
            let fails = rng.random_bool(failure_rate);
            let halfway = steps.div_ceil(2);

            for step in 1..=steps {
                tokio::time::sleep(step_duration).await;
                if step == halfway {
                    if fails {
                        return Err(ExecutionError::transient(format!(
                            "Trainer lost its worker in step {step} of attempt {attempt}"
                        )));
                    }
                    ctx.progress.report(PROGRESS_HALFWAY);
                }
            }

            // Header line is not a sample
            let rows = ctx
                .dataset
                .data
                .iter()
                .filter(|&&b| b == b'\n')
                .count()
                .saturating_sub(1) as f64;
            let train_rows = (rows * ctx.train_test_split).round();

            let mut metrics: Map<String, f64> = Map::default();
            metrics.insert(
                metric_name(ctx.spec.kind).to_string(),
                round_metric(0.6 + 0.35 * rng.random::<f64>()),
            );
            metrics.insert("train_rows".to_string(), train_rows);
            metrics.insert("test_rows".to_string(), rows - train_rows);
            metrics.insert("steps".to_string(), steps as f64);

            log::debug!(
                "Simulated {} finished for job {} (attempt {attempt})",
                ctx.spec.kind,
                ctx.job_id
            );
            Ok(TrainOutput {
                artifact: ArtifactRef(format!("models/{}/job-{}.bin", ctx.spec.id, ctx.job_id)),
                metrics,
                peak_memory_mb: None,
            })
        }
        .boxed_local()
    }
}

/// Ledger that only logs postings.
#[derive(Default)]
pub struct LogLedger;

impl BillingLedger for LogLedger {
    fn record_cost(&self, owner: &str, job_id: JobId, amount: f64) -> CollaboratorFuture {
        log::info!("Charging {amount:.6} to '{owner}' for job {job_id}");
        async { Ok(()) }.boxed_local()
    }
}

#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, owner: &str, event: &JobEvent) -> CollaboratorFuture {
        match event {
            JobEvent::Started {
                job_id,
                resource_id,
            } => log::info!("[{owner}] Job {job_id} started on resource {resource_id}"),
            JobEvent::Completed {
                job_id,
                actual_cost,
            } => log::info!("[{owner}] Job {job_id} completed, cost {actual_cost:.6}"),
            JobEvent::Failed { job_id, error } => {
                log::info!("[{owner}] Job {job_id} failed: {error}")
            }
            JobEvent::Cancelled { job_id } => log::info!("[{owner}] Job {job_id} cancelled"),
        }
        async { Ok(()) }.boxed_local()
    }
}

pub fn create_services(config: &AppConfig) -> Services {
    let trainer = Rc::new(SimulatedTrainer::new(config.trainer.clone()));
    let kinds: &[AlgorithmKind] = if config.trainer.kinds.is_empty() {
        &AlgorithmKind::ALL
    } else {
        &config.trainer.kinds
    };
    let mut trainers = TrainerRegistry::new();
    for kind in kinds {
        trainers.register(*kind, trainer.clone());
    }

    Services {
        algorithms: Rc::new(StaticCatalog::new(
            config.algorithms.iter().map(|a| a.to_spec()),
        )),
        access: Rc::new(DatasetAcl::new(&config.datasets)),
        datasets: Rc::new(InMemoryDatasetStore::new(&config.datasets)),
        trainers,
        ledger: Rc::new(LogLedger),
        notifier: Rc::new(LogNotifier),
    }
}

#[cfg(test)]
mod tests {
    use super::{DatasetAcl, InMemoryDatasetStore, generate_dataset};
    use crate::config::DatasetConfig;
    use trainq_core::services::{AccessPolicy, DatasetStore};

    fn dataset(id: &str) -> DatasetConfig {
        DatasetConfig {
            id: id.to_string(),
            rows: 4,
            columns: Vec::new(),
            target: Some("label".to_string()),
            allowed_owners: Vec::new(),
            corrupted: false,
            flaky_loads: 0,
        }
    }

    #[test]
    fn test_generated_dataset() {
        let data = generate_dataset(&dataset("d"));
        let text = String::from_utf8(data.data).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "feature_0,feature_1,label");
        assert_eq!(lines[2], "1,2,3");
        assert_eq!(data.schema.target.as_deref(), Some("label"));
    }

    #[test]
    fn test_dataset_acl() {
        let mut private = dataset("private");
        private.allowed_owners = vec!["alice".to_string()];
        let acl = DatasetAcl::new(&[dataset("public"), private]);

        assert!(acl.check_dataset_access("bob", &"public".to_string()).is_ok());
        assert!(
            acl.check_dataset_access("alice", &"private".to_string())
                .is_ok()
        );
        assert!(
            acl.check_dataset_access("bob", &"private".to_string())
                .unwrap_err()
                .contains("no access")
        );
        assert!(
            acl.check_dataset_access("bob", &"missing".to_string())
                .unwrap_err()
                .contains("does not exist")
        );
    }

    #[tokio::test]
    async fn test_flaky_and_corrupted_loads() {
        let mut flaky = dataset("flaky");
        flaky.flaky_loads = 1;
        let mut corrupted = dataset("corrupted");
        corrupted.corrupted = true;
        let store = InMemoryDatasetStore::new(&[flaky, corrupted]);

        let error = store.load(&"flaky".to_string()).await.unwrap_err();
        assert!(error.is_transient());
        assert!(store.load(&"flaky".to_string()).await.is_ok());

        let error = store.load(&"corrupted".to_string()).await.unwrap_err();
        assert!(!error.is_transient());
        assert!(
            !store
                .load(&"unknown".to_string())
                .await
                .unwrap_err()
                .is_transient()
        );
    }
}
