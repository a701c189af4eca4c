//! Core data model.
//!
//! A work item is one admitted unit of work waiting in the dispatch queue.
//! It carries a correlation id, a display name for diagnostics, and the tag
//! of the job type the worker will construct when it dequeues the item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Newtype for work item IDs. Returned to callers as a correlation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names a job type registered with the [`JobRegistry`](crate::job::JobRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobTag(String);

impl JobTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A pending unit of work. Immutable once admitted; consumed by the worker.
#[derive(Debug, Serialize)]
pub struct WorkItem {
    pub id: WorkId,
    pub display_name: String,
    /// Which job to construct. Resolved at dequeue time, not at enqueue time.
    pub job: JobTag,
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    pub(crate) fn new(job: JobTag, display_name: impl Into<String>) -> Self {
        Self {
            id: WorkId::new(),
            display_name: display_name.into(),
            job,
            enqueued_at: Utc::now(),
        }
    }
}
