pub(crate) mod admission;
pub(crate) mod comm;
pub(crate) mod core;
pub(crate) mod job;
pub(crate) mod pool;
pub(crate) mod postprocess;
pub(crate) mod reactor;
pub(crate) mod resource;
