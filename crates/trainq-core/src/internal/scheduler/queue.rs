use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};

use crate::config::DispatchOrder;
use crate::internal::common::ids::{JobId, QueuePosition};
use crate::internal::common::{IdCounter, Map};
use crate::internal::server::job::Priority;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub position: QueuePosition,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
    pub estimated_start: Option<DateTime<Utc>>,
}

// Bigger key is dispatched first
type QueueKey = (Priority, Reverse<QueuePosition>);

/// Holding area for admitted jobs that wait for a resource.
pub struct JobQueue {
    order: DispatchOrder,
    positions: IdCounter,
    entries: Map<JobId, QueueEntry>,
    heap: PriorityQueue<JobId, QueueKey, fxhash::FxBuildHasher>,
}

impl JobQueue {
    pub fn new(order: DispatchOrder) -> Self {
        JobQueue {
            order,
            positions: Default::default(),
            entries: Default::default(),
            heap: Default::default(),
        }
    }

    fn key(&self, entry: &QueueEntry) -> QueueKey {
        let priority = match self.order {
            DispatchOrder::Fifo => Priority::Normal,
            DispatchOrder::Priority => entry.priority,
        };
        (priority, Reverse(entry.position))
    }

    /// Appends the job and returns its position. Positions are never reused.
    pub fn enqueue(&mut self, job_id: JobId, priority: Priority) -> QueuePosition {
        assert!(
            !self.entries.contains_key(&job_id),
            "Job {job_id} is already queued"
        );
        let position = self.positions.next();
        let entry = QueueEntry {
            job_id,
            position,
            priority,
            enqueued_at: Utc::now(),
            estimated_start: None,
        };
        let key = self.key(&entry);
        self.heap.push(job_id, key);
        self.entries.insert(job_id, entry);
        position
    }

    /// Removes the job from the queue. Removing a job that is not queued is a no-op.
    pub fn dequeue(&mut self, job_id: JobId) -> Option<QueueEntry> {
        let entry = self.entries.remove(&job_id)?;
        self.heap.remove(&job_id);
        Some(entry)
    }

    /// Entry that would be dispatched next.
    pub fn peek(&self) -> Option<&QueueEntry> {
        self.heap
            .peek()
            .map(|(job_id, _)| &self.entries[job_id])
    }

    pub fn get(&self, job_id: JobId) -> Option<&QueueEntry> {
        self.entries.get(&job_id)
    }

    #[inline]
    pub fn contains(&self, job_id: JobId) -> bool {
        self.entries.contains_key(&job_id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Job ids in dispatch order.
    pub fn ordered_job_ids(&self) -> Vec<JobId> {
        let mut keys: Vec<(QueueKey, JobId)> = self
            .entries
            .values()
            .map(|entry| (self.key(entry), entry.job_id))
            .collect();
        keys.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        keys.into_iter().map(|(_, job_id)| job_id).collect()
    }

    /// Entries in dispatch order.
    pub fn entries(&self) -> Vec<QueueEntry> {
        self.ordered_job_ids()
            .into_iter()
            .map(|job_id| self.entries[&job_id].clone())
            .collect()
    }

    pub fn set_estimated_start(&mut self, job_id: JobId, estimate: Option<DateTime<Utc>>) {
        if let Some(entry) = self.entries.get_mut(&job_id) {
            entry.estimated_start = estimate;
        }
    }
}
