//! # homefin-dispatch
//!
//! Serial background job dispatch for the household-finance service.
//!
//! Request handlers admit work through a bounded [`DispatchQueue`]; a single
//! [`DispatchWorker`] builds each job from the [`JobRegistry`] and runs it
//! under a shared cancellation token, publishing startup, liveness and
//! readiness through [`HealthState`].
//!
//! [`DispatchQueue`]: dispatch::DispatchQueue
//! [`DispatchWorker`]: dispatch::DispatchWorker
//! [`JobRegistry`]: job::JobRegistry
//! [`HealthState`]: health::HealthState

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod job;
pub mod model;
pub mod telemetry;
