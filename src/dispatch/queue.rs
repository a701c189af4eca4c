//! Bounded FIFO of pending work items.
//!
//! Pure storage plus admission control: the queue never runs anything.
//! `enqueue` never blocks; a full queue rejects with
//! [`Error::CapacityExceeded`] so backpressure reaches the caller.

use crate::error::{Error, Result};
use crate::job::JobType;
use crate::model::{JobTag, WorkId, WorkItem};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct DispatchQueue {
    items: Mutex<VecDeque<WorkItem>>,
    max_length: usize,
    ready: Notify,
}

impl DispatchQueue {
    /// Create a queue admitting at most `max_length` pending items.
    pub fn new(max_length: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(max_length.min(1024))),
            max_length,
            ready: Notify::new(),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Admit a job of type `J`. Returns the id assigned to the work item.
    pub fn enqueue<J: JobType>(&self, display_name: impl Into<String>) -> Result<WorkId> {
        self.enqueue_tag(J::TAG, display_name)
    }

    /// Admit a job by tag. The tag is not checked against any registry here;
    /// an unknown tag fails when the worker tries to build it.
    pub fn enqueue_tag(
        &self,
        job: impl Into<JobTag>,
        display_name: impl Into<String>,
    ) -> Result<WorkId> {
        let item = WorkItem::new(job.into(), display_name);
        let id = item.id;
        let tag = item.job.to_string();

        let depth = {
            let mut items = self.lock();
            if items.len() >= self.max_length {
                drop(items);
                warn!(job.tag = %tag, max_length = self.max_length, "dispatch queue full, rejecting");
                metrics::dispatch_rejected().add(1, &[KeyValue::new("job_tag", tag)]);
                return Err(Error::CapacityExceeded {
                    max_length: self.max_length,
                });
            }
            items.push_back(item);
            items.len()
        };

        self.ready.notify_one();
        debug!(work.id = %id, job.tag = %tag, depth, "work enqueued");
        metrics::dispatch_enqueued().add(1, &[KeyValue::new("job_tag", tag)]);
        Ok(id)
    }

    /// Remove and return the oldest pending item, if any.
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        self.lock().pop_front()
    }

    /// Number of pending items.
    pub fn depth(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Resolves once an item has been enqueued since the last wake-up.
    pub(crate) async fn wait_ready(&self) {
        self.ready.notified().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
