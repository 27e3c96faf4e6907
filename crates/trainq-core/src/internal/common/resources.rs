use serde::{Deserialize, Serialize};

pub const MIB_PER_GIB: u64 = 1024;

/// Resources a job asks for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceRequirements {
    pub cpu_cores: u32,
    pub memory_mb: u64,
    #[serde(default)]
    pub use_gpu: bool,
}

impl ResourceRequirements {
    pub fn new(cpu_cores: u32, memory_mb: u64, use_gpu: bool) -> Self {
        ResourceRequirements {
            cpu_cores,
            memory_mb,
            use_gpu,
        }
    }

    /// Returns true if `self` asks for at least as much as `minimum` in every dimension.
    pub fn covers(&self, minimum: &ResourceRequirements) -> bool {
        self.cpu_cores >= minimum.cpu_cores
            && self.memory_mb >= minimum.memory_mb
            && (self.use_gpu || !minimum.use_gpu)
    }
}

/// What a compute resource offers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceCapacity {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default)]
    pub gpu_type: Option<String>,
    #[serde(default)]
    pub storage_gb: u32,
}

impl ResourceCapacity {
    pub fn new(cpu_cores: u32, memory_gb: u32) -> Self {
        ResourceCapacity {
            cpu_cores,
            memory_gb,
            ..Default::default()
        }
    }

    pub fn with_gpus(mut self, gpu_count: u32, gpu_type: Option<String>) -> Self {
        self.gpu_count = gpu_count;
        self.gpu_type = gpu_type;
        self
    }

    #[inline]
    pub fn memory_mb(&self) -> u64 {
        self.memory_gb as u64 * MIB_PER_GIB
    }

    pub fn satisfies(&self, rq: &ResourceRequirements) -> bool {
        self.cpu_cores >= rq.cpu_cores
            && self.memory_mb() >= rq.memory_mb
            && (!rq.use_gpu || self.gpu_count > 0)
    }
}
