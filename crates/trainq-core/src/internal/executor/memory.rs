use std::time::Duration;

use psutil::process::Process;
use tokio::time::{Interval, MissedTickBehavior};

use crate::internal::server::core::CoreRef;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Periodically samples the resident memory of the process hosting the
/// execution and keeps the peak.
///
/// The process is shared by every execution, so the figure only belongs to
/// one job when no other resource was busy at any sample. Otherwise the peak
/// is discarded.
pub(crate) struct MemorySampler {
    process: Option<Process>,
    interval: Interval,
    core_ref: CoreRef,
    peak_bytes: u64,
    shared: bool,
}

impl MemorySampler {
    pub fn new(period: Duration, core_ref: CoreRef) -> Self {
        let process = Process::current()
            .map_err(|error| log::warn!("Memory sampling is not available: {error:?}"))
            .ok();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        MemorySampler {
            process,
            interval,
            core_ref,
            peak_bytes: 0,
            shared: false,
        }
    }

    pub fn sample(&mut self) {
        let Some(process) = &self.process else {
            return;
        };
        if self.core_ref.get().pool().busy_count() > 1 {
            self.shared = true;
        }
        match process.memory_info() {
            Ok(info) => self.peak_bytes = self.peak_bytes.max(info.rss()),
            Err(error) => log::debug!("Cannot read process memory: {error:?}"),
        }
    }

    /// Waits for the next sampling period and takes a sample.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
        self.sample();
    }

    pub fn peak_mb(&self) -> Option<u64> {
        (!self.shared && self.peak_bytes > 0).then(|| self.peak_bytes.div_ceil(BYTES_PER_MIB))
    }
}
