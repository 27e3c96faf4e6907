use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use futures::FutureExt;

use crate::events::{JobEvent, Notifier};
use crate::internal::common::error::ExecutionError;
use crate::internal::common::ids::{DatasetId, JobId};
use crate::internal::common::resources::ResourceRequirements;
use crate::internal::common::{Map, Set};
use crate::services::{
    AccessPolicy, AlgorithmCatalog, AlgorithmKind, AlgorithmSpec, ArtifactRef, BillingLedger,
    CollaboratorFuture, Dataset, DatasetFuture, DatasetSchema, DatasetStore, Services,
    TrainContext, TrainFuture, TrainOutput, Trainer, TrainerRegistry,
};

pub const RF_RATE: f64 = 2.0;
pub const LR_RATE: f64 = 0.5;
pub const NN_RATE: f64 = 10.0;

pub struct FakeCatalog {
    specs: Map<String, AlgorithmSpec>,
}

fn spec(
    id: &str,
    kind: AlgorithmKind,
    cost_per_hour: f64,
    enabled: bool,
    min_requirements: ResourceRequirements,
) -> AlgorithmSpec {
    AlgorithmSpec {
        id: id.to_string(),
        kind,
        cost_per_hour,
        enabled,
        min_requirements,
    }
}

impl Default for FakeCatalog {
    fn default() -> Self {
        let specs = [
            spec(
                "rf",
                AlgorithmKind::RandomForest,
                RF_RATE,
                true,
                ResourceRequirements::new(1, 512, false),
            ),
            spec(
                "lr",
                AlgorithmKind::LinearRegression,
                LR_RATE,
                true,
                ResourceRequirements::new(1, 256, false),
            ),
            spec(
                "nn",
                AlgorithmKind::NeuralNetwork,
                NN_RATE,
                true,
                ResourceRequirements::new(2, 4096, true),
            ),
            // No trainer is registered for this one
            spec(
                "kmeans",
                AlgorithmKind::KMeans,
                1.0,
                true,
                ResourceRequirements::new(1, 256, false),
            ),
            spec(
                "svm",
                AlgorithmKind::SupportVectorMachine,
                1.0,
                false,
                ResourceRequirements::new(1, 256, false),
            ),
        ];
        FakeCatalog {
            specs: specs.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

impl AlgorithmCatalog for FakeCatalog {
    fn lookup(&self, algorithm_id: &str) -> Option<AlgorithmSpec> {
        self.specs.get(algorithm_id).cloned()
    }
}

#[derive(Default)]
pub struct FakeAccess {
    pub denied: Set<DatasetId>,
}

impl AccessPolicy for FakeAccess {
    fn check_dataset_access(&self, owner: &str, dataset_id: &DatasetId) -> Result<(), String> {
        if self.denied.contains(dataset_id) {
            Err(format!("'{owner}' may not use dataset '{dataset_id}'"))
        } else {
            Ok(())
        }
    }
}

/// Serves every dataset id with the same small content. Queued failures are
/// returned first, one per load.
#[derive(Default)]
pub struct FakeDatasetStore {
    pub failures: RefCell<VecDeque<ExecutionError>>,
    pub loads: Cell<u32>,
}

impl FakeDatasetStore {
    pub fn fail_next(&self, error: ExecutionError) {
        self.failures.borrow_mut().push_back(error);
    }
}

impl DatasetStore for FakeDatasetStore {
    fn load(&self, _dataset_id: &DatasetId) -> DatasetFuture {
        self.loads.set(self.loads.get() + 1);
        let result = match self.failures.borrow_mut().pop_front() {
            Some(error) => Err(error),
            None => Ok(Dataset {
                data: b"x,y\n1,2\n3,4\n".to_vec(),
                schema: DatasetSchema {
                    columns: vec!["x".to_string(), "y".to_string()],
                    target: Some("y".to_string()),
                },
            }),
        };
        async move { result }.boxed_local()
    }
}

/// Trainer that sleeps for `duration` and then returns the next scripted
/// result (success when nothing is scripted).
pub struct ScriptedTrainer {
    pub duration: Cell<Duration>,
    pub results: RefCell<VecDeque<Result<(), ExecutionError>>>,
    pub calls: Cell<u32>,
    /// Attempt numbers passed to the trainer, in call order.
    pub attempts: RefCell<Vec<u32>>,
    pub peak_memory_mb: Cell<Option<u64>>,
    /// The next call panics halfway through training.
    pub panic_next: Cell<bool>,
}

impl Default for ScriptedTrainer {
    fn default() -> Self {
        ScriptedTrainer {
            duration: Cell::new(Duration::from_secs(36)),
            results: Default::default(),
            calls: Cell::new(0),
            attempts: Default::default(),
            peak_memory_mb: Cell::new(None),
            panic_next: Cell::new(false),
        }
    }
}

impl ScriptedTrainer {
    pub fn push_result(&self, result: Result<(), ExecutionError>) {
        self.results.borrow_mut().push_back(result);
    }
}

impl Trainer for ScriptedTrainer {
    fn fit_and_evaluate(&self, ctx: TrainContext) -> TrainFuture {
        self.calls.set(self.calls.get() + 1);
        self.attempts.borrow_mut().push(ctx.attempt);
        let result = self.results.borrow_mut().pop_front().unwrap_or(Ok(()));
        let duration = self.duration.get();
        let peak_memory_mb = self.peak_memory_mb.get();
        let panics = self.panic_next.replace(false);
        async move {
            tokio::time::sleep(duration / 2).await;
            if panics {
                panic!("trainer bug");
            }
            ctx.progress.report(60);
            tokio::time::sleep(duration / 2).await;
            if let Err(error) = result {
                return Err(error);
            }
            let mut metrics: Map<String, f64> = Default::default();
            metrics.insert("accuracy".to_string(), 0.9);
            metrics.insert("rows".to_string(), ctx.dataset.data.len() as f64);
            Ok(TrainOutput {
                artifact: ArtifactRef(format!("model-{}", ctx.job_id)),
                metrics,
                peak_memory_mb,
            })
        }
        .boxed_local()
    }
}

#[derive(Default)]
pub struct RecordingLedger {
    pub entries: RefCell<Vec<(String, JobId, f64)>>,
    pub fail: Cell<bool>,
}

impl BillingLedger for RecordingLedger {
    fn record_cost(&self, owner: &str, job_id: JobId, amount: f64) -> CollaboratorFuture {
        if self.fail.get() {
            return async { Err(anyhow::anyhow!("Ledger is down")) }.boxed_local();
        }
        self.entries
            .borrow_mut()
            .push((owner.to_string(), job_id, amount));
        async { Ok(()) }.boxed_local()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: RefCell<Vec<(String, JobEvent)>>,
    pub fail: Cell<bool>,
}

impl RecordingNotifier {
    pub fn job_events(&self, job_id: JobId) -> Vec<JobEvent> {
        self.events
            .borrow()
            .iter()
            .filter(|(_, event)| event.job_id() == job_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, owner: &str, event: &JobEvent) -> CollaboratorFuture {
        if self.fail.get() {
            return async { Err(anyhow::anyhow!("Mail server is down")) }.boxed_local();
        }
        self.events
            .borrow_mut()
            .push((owner.to_string(), event.clone()));
        async { Ok(()) }.boxed_local()
    }
}

/// Fake collaborators, kept so that tests can script and inspect them.
#[derive(Default, Clone)]
pub struct TestServices {
    pub access: Rc<FakeAccess>,
    pub datasets: Rc<FakeDatasetStore>,
    pub trainer: Rc<ScriptedTrainer>,
    pub ledger: Rc<RecordingLedger>,
    pub notifier: Rc<RecordingNotifier>,
}

impl TestServices {
    pub fn deny_dataset(dataset_id: &str) -> Self {
        let mut access = FakeAccess::default();
        access.denied.insert(dataset_id.to_string());
        TestServices {
            access: Rc::new(access),
            ..Default::default()
        }
    }

    pub fn services(&self) -> Services {
        let trainers = TrainerRegistry::new()
            .with(AlgorithmKind::RandomForest, self.trainer.clone())
            .with(AlgorithmKind::LinearRegression, self.trainer.clone())
            .with(AlgorithmKind::NeuralNetwork, self.trainer.clone());
        Services {
            algorithms: Rc::new(FakeCatalog::default()),
            access: self.access.clone(),
            datasets: self.datasets.clone(),
            trainers,
            ledger: self.ledger.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
