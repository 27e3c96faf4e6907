use std::rc::Rc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::internal::server::comm::WorkItem;
use crate::services::Services;

/// Handles follow-up work of state transitions: cost posting and
/// notifications. Failures are logged and never reach the job state.
///
/// Ledger entries are posted one by one in the order they were produced.
/// Notifications are fire-and-forget, each of them runs as its own task.
pub(crate) async fn work_loop(services: Rc<Services>, mut receiver: UnboundedReceiver<WorkItem>) {
    while let Some(item) = receiver.recv().await {
        match item {
            WorkItem::RecordCost {
                owner,
                job_id,
                amount,
            } => {
                log::debug!("Recording cost {amount:.6} of job {job_id} for '{owner}'");
                if let Err(error) = services.ledger.record_cost(&owner, job_id, amount).await {
                    log::error!("Recording cost of job {job_id} failed: {error:?}");
                }
            }
            WorkItem::Notify { owner, event } => {
                let future = services.notifier.notify(&owner, &event);
                tokio::task::spawn_local(async move {
                    if let Err(error) = future.await {
                        log::warn!(
                            "Notification of '{owner}' about job {} failed: {error:?}",
                            event.job_id()
                        );
                    }
                });
            }
        }
    }
    log::debug!("Post-processing loop finished");
}
