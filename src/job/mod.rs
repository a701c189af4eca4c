//! Job abstraction and registry.
//!
//! A job is a unit of work with a single capability: run to completion
//! under a cancellation token. Jobs are built fresh for every dequeued
//! work item by a factory looked up in the [`JobRegistry`], so a failure
//! to build surfaces in the worker rather than in the caller of `enqueue`.

pub mod registry;
pub mod seed;

use crate::error::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use registry::{JobFactory, JobRegistry};
pub use seed::SeedSampleData;

/// A unit of background work.
///
/// `run` is invoked at most once per work item. Implementations own their
/// transaction boundaries and should check `cancel` between steps; the
/// dispatcher cannot preempt a job that never looks at it.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

/// Associates a job type with the tag it is registered and enqueued under.
pub trait JobType {
    const TAG: &'static str;
}
