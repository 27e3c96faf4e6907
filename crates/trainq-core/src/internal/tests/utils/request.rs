use derive_builder::Builder;

use crate::internal::server::job::{JobRequest, Priority};

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(name = "finish"))]
pub struct JobRequestConfig {
    #[builder(default = "\"rf\".to_string()", setter(into))]
    algorithm: String,
    #[builder(default = "\"iris\".to_string()", setter(into))]
    dataset: String,
    #[builder(default = "0.8")]
    split: f64,
    #[builder(default)]
    seed: u64,
    #[builder(default = "1")]
    hours: u32,
    #[builder(default = "1024")]
    memory_mb: u64,
    #[builder(default = "1")]
    cpus: u32,
    #[builder(default)]
    gpu: bool,
    #[builder(default)]
    priority: Priority,
}

impl JobRequestConfigBuilder {
    pub fn build(self) -> JobRequest {
        let config = self.finish().unwrap();
        JobRequest {
            algorithm_id: config.algorithm,
            dataset_id: config.dataset,
            parameters: Default::default(),
            train_test_split: config.split,
            random_seed: config.seed,
            max_runtime_hours: config.hours,
            memory_limit_mb: config.memory_mb,
            cpu_cores: config.cpus,
            use_gpu: config.gpu,
            priority: config.priority,
        }
    }
}

/// Request builder with defaults that pass admission: random forest on "iris",
/// one core, 1 GiB, one hour.
pub fn rq() -> JobRequestConfigBuilder {
    JobRequestConfigBuilder::default()
}
