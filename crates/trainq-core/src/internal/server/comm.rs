use std::rc::Rc;

use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;

use crate::events::JobEvent;
use crate::internal::common::WrappedRcRefCell;
use crate::internal::common::ids::{JobId, OwnerId};

/// Follow-up work produced by state transitions. Each item is handled by the
/// post-processing loop as an independent unit, never inline.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkItem {
    RecordCost {
        owner: OwnerId,
        job_id: JobId,
        amount: f64,
    },
    Notify {
        owner: OwnerId,
        event: JobEvent,
    },
}

pub trait Comm {
    /// Requests a dispatch pass. Repeated requests before the pass runs are merged.
    fn ask_for_scheduling(&mut self);
    fn send_work(&mut self, item: WorkItem);
}

pub struct CommSender {
    need_scheduling: bool,
    scheduler_wakeup: Rc<Notify>,
    work_sender: UnboundedSender<WorkItem>,
}

pub(crate) type CommSenderRef = WrappedRcRefCell<CommSender>;

impl CommSenderRef {
    pub fn new(scheduler_wakeup: Rc<Notify>, work_sender: UnboundedSender<WorkItem>) -> Self {
        WrappedRcRefCell::wrap(CommSender {
            need_scheduling: false,
            scheduler_wakeup,
            work_sender,
        })
    }
}

impl CommSender {
    pub fn reset_scheduling_flag(&mut self) {
        self.need_scheduling = false
    }

    pub fn get_scheduling_flag(&self) -> bool {
        self.need_scheduling
    }
}

impl Comm for CommSender {
    #[inline]
    fn ask_for_scheduling(&mut self) {
        if !self.need_scheduling {
            self.need_scheduling = true;
            self.scheduler_wakeup.notify_one();
        }
    }

    fn send_work(&mut self, item: WorkItem) {
        if let Err(error) = self.work_sender.send(item) {
            log::error!("Post-processing loop is gone, dropping {:?}", error.0);
        }
    }
}
