//! Serial background dispatch: a bounded queue fed by request handlers and
//! drained by exactly one worker.

pub mod queue;
pub mod worker;

pub use queue::DispatchQueue;
pub use worker::{DispatchWorker, WorkerExit, WorkerHandle, WorkerStats};
