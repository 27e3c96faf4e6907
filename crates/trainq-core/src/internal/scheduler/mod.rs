pub(crate) mod dispatch;
pub(crate) mod queue;

pub(crate) use dispatch::{Dispatch, run_scheduling_now, scheduler_loop};
