//! Serial dispatch worker: drains the queue one item at a time.
//!
//! Each dequeued item gets its job built and run inside its own tokio task,
//! so an error or a panic in either step is contained and the loop moves
//! on to the next item. Jobs never overlap. The worker owns all writes to
//! [`HealthState`].

use super::queue::DispatchQueue;
use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::health::{HealthState, ProbeStatus, StartupStatus};
use crate::job::JobRegistry;
use crate::model::{JobTag, WorkId, WorkItem};
use crate::telemetry::dispatch::{record_outcome, start_job_span};
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

/// Counters kept by the worker loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Jobs that stopped because they observed the shutdown signal.
    pub cancelled: u64,
    pub construction_failures: u64,
    pub interrupted: u64,
    pub in_flight: Option<WorkId>,
    pub last_job_at: Option<DateTime<Utc>>,
}

/// How the worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested and no job was left running.
    Clean,
    /// Shutdown was requested and the in-flight job outlived the grace period.
    Interrupted { work_id: WorkId, job: JobTag },
    /// The worker task itself died.
    Panicked,
}

/// What happened to one dequeued item.
enum Dispatched {
    Succeeded,
    ConstructionFailed(Error),
    Failed(Error),
    Cancelled,
    Interrupted,
}

impl Dispatched {
    fn label(&self) -> &'static str {
        match self {
            Dispatched::Succeeded => "succeeded",
            Dispatched::ConstructionFailed(_) => "construction_failed",
            Dispatched::Failed(_) => "failed",
            Dispatched::Cancelled => "cancelled",
            Dispatched::Interrupted => "interrupted",
        }
    }
}

/// Which step of a job task failed.
enum TaskFailure {
    Construct(Error),
    Run(Error),
}

pub struct DispatchWorker {
    queue: Arc<DispatchQueue>,
    registry: Arc<JobRegistry>,
    health: Arc<HealthState>,
    config: DispatchConfig,
    stats: Arc<Mutex<WorkerStats>>,
}

impl DispatchWorker {
    /// `config.max_length` is taken from the queue so readiness thresholds
    /// always match the bound the queue enforces. Settings the loop cannot
    /// run with (such as a zero `idle_wait`) are rejected here.
    pub fn new(
        queue: Arc<DispatchQueue>,
        registry: Arc<JobRegistry>,
        health: Arc<HealthState>,
        config: DispatchConfig,
    ) -> Result<Self> {
        let config = DispatchConfig {
            max_length: queue.max_length(),
            ..config
        };
        config.validate()?;
        Ok(Self {
            queue,
            registry,
            health,
            config,
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        })
    }

    pub fn stats(&self) -> WorkerStats {
        lock_stats(&self.stats).clone()
    }

    /// Run the loop on a new tokio task. Cancelling `cancel` stops it.
    ///
    /// A watcher task awaits the loop, so health is marked dead as soon as
    /// the loop panics rather than when someone joins the handle.
    pub fn spawn(self, cancel: CancellationToken) -> WorkerHandle {
        let stats = Arc::clone(&self.stats);
        let health = Arc::clone(&self.health);
        let token = cancel.clone();
        let inner = tokio::spawn(async move { self.run(token).await });
        let join = supervise(inner, Arc::clone(&stats), Arc::clone(&health));
        WorkerHandle {
            cancel,
            join,
            stats,
            health,
        }
    }

    /// Run the loop until `cancel` fires. Never restarts once returned.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerExit {
        self.health.startup.set(StartupStatus::Healthy, None);
        self.health.liveness.set(ProbeStatus::Healthy, None);
        self.health.readiness.set(ProbeStatus::Healthy, None);
        info!(
            max_length = self.config.max_length,
            idle_wait_ms = self.config.idle_wait.as_millis() as u64,
            "dispatch worker started"
        );

        let exit = loop {
            self.heartbeat();
            if cancel.is_cancelled() {
                break WorkerExit::Clean;
            }

            let Some(item) = self.queue.try_dequeue() else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break WorkerExit::Clean,
                    _ = self.queue.wait_ready() => {}
                    _ = tokio::time::sleep(self.config.idle_wait) => {}
                }
                continue;
            };

            let work_id = item.id;
            let job = item.job.clone();
            if let Dispatched::Interrupted = self.dispatch(item, &cancel).await {
                break WorkerExit::Interrupted { work_id, job };
            }
        };

        self.finish(&exit);
        exit
    }

    /// Build and run one item, containing every failure.
    async fn dispatch(&self, item: WorkItem, cancel: &CancellationToken) -> Dispatched {
        let span = start_job_span(&item.job, item.id, &item.display_name);
        let started = Instant::now();
        lock_stats(&self.stats).in_flight = Some(item.id);

        let registry = Arc::clone(&self.registry);
        let tag = item.job.clone();
        let token = cancel.clone();
        let mut task: JoinHandle<std::result::Result<(), TaskFailure>> = tokio::spawn(
            async move {
                let job = registry.build(&tag).map_err(TaskFailure::Construct)?;
                job.run(token).await.map_err(TaskFailure::Run)
            }
            .instrument(span.clone()),
        );

        let mut ticker = tokio::time::interval(self.config.idle_wait);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let joined = loop {
            tokio::select! {
                res = &mut task => break Some(res),
                _ = cancel.cancelled() => {
                    match tokio::time::timeout(self.config.shutdown_grace, &mut task).await {
                        Ok(res) => break Some(res),
                        Err(_) => {
                            task.abort();
                            break None;
                        }
                    }
                }
                _ = ticker.tick() => self.refresh_readiness(),
            }
        };

        let outcome = match joined {
            None => Dispatched::Interrupted,
            Some(res) => classify(&item.job, res),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.record(&item, &outcome, duration_ms);
        record_outcome(&span, outcome.label());
        span.in_scope(|| match &outcome {
            Dispatched::Succeeded => info!(duration_ms, "job completed"),
            Dispatched::ConstructionFailed(e) => {
                error!(error = %e, "job could not be constructed, dropping work item")
            }
            Dispatched::Cancelled => warn!(duration_ms, "job stopped on cancellation"),
            Dispatched::Failed(e) => error!(duration_ms, error = %e, "job failed, dropping work item"),
            Dispatched::Interrupted => {
                let e = Error::ShutdownInterrupted {
                    grace: self.config.shutdown_grace,
                };
                error!(error = %e, "aborted in-flight job at shutdown")
            }
        });
        outcome
    }

    fn record(&self, item: &WorkItem, outcome: &Dispatched, duration_ms: u64) {
        {
            let mut stats = lock_stats(&self.stats);
            stats.in_flight = None;
            stats.processed += 1;
            stats.last_job_at = Some(Utc::now());
            match outcome {
                Dispatched::Succeeded => stats.succeeded += 1,
                Dispatched::ConstructionFailed(_) => stats.construction_failures += 1,
                Dispatched::Failed(_) => stats.failed += 1,
                Dispatched::Cancelled => stats.cancelled += 1,
                Dispatched::Interrupted => stats.interrupted += 1,
            }
        }

        let tag = KeyValue::new("job_tag", item.job.to_string());
        metrics::dispatch_jobs().add(
            1,
            &[tag.clone(), KeyValue::new("outcome", outcome.label())],
        );
        metrics::job_duration_ms().record(duration_ms as f64, &[tag]);
    }

    /// Re-affirm liveness and recompute readiness. Runs every loop iteration.
    fn heartbeat(&self) {
        self.health.liveness.set(ProbeStatus::Healthy, None);
        self.refresh_readiness();
    }

    fn refresh_readiness(&self) {
        let depth = self.queue.depth();
        metrics::queue_depth().record(depth as u64, &[]);
        if depth >= self.config.degraded_depth() {
            self.health.readiness.set(
                ProbeStatus::Degraded,
                Some(format!(
                    "queue depth {depth} of {} pending",
                    self.config.max_length
                )),
            );
        } else {
            self.health.readiness.set(ProbeStatus::Healthy, None);
        }
    }

    fn finish(&self, exit: &WorkerExit) {
        match exit {
            WorkerExit::Clean => {
                let msg = Some("dispatch worker stopped".to_string());
                self.health.liveness.set(ProbeStatus::Degraded, msg.clone());
                self.health.readiness.set(ProbeStatus::Degraded, msg);
                info!(pending = self.queue.depth(), "dispatch worker stopped");
            }
            WorkerExit::Interrupted { work_id, job } => {
                let msg = Some(format!("shutdown interrupted job {job} ({work_id})"));
                self.health.liveness.set(ProbeStatus::Unhealthy, msg.clone());
                self.health.readiness.set(ProbeStatus::Unhealthy, msg);
                warn!(%work_id, job.tag = %job, "dispatch worker stopped abnormally");
            }
            WorkerExit::Panicked => mark_dead(&self.health, "dispatch worker panicked"),
        }
    }
}

/// Handle to a spawned worker.
#[derive(Debug)]
pub struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<WorkerExit>,
    stats: Arc<Mutex<WorkerStats>>,
    health: Arc<HealthState>,
}

impl WorkerHandle {
    pub fn stats(&self) -> WorkerStats {
        lock_stats(&self.stats).clone()
    }

    /// True once the loop has returned.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// The token the worker and its in-flight job observe.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) -> WorkerExit {
        self.cancel.cancel();
        self.join().await
    }

    /// Poll until at least `count` items have been processed. Returns
    /// `None` if the worker stops first.
    pub async fn wait_for_processed(&self, count: u64, poll: Duration) -> Option<WorkerStats> {
        loop {
            let stats = self.stats();
            if stats.processed >= count {
                return Some(stats);
            }
            if self.is_finished() {
                let stats = self.stats();
                return (stats.processed >= count).then_some(stats);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Wait for the loop to exit without signalling it.
    pub async fn join(self) -> WorkerExit {
        match self.join.await {
            Ok(exit) => exit,
            Err(e) => {
                error!(error = %e, "dispatch worker task died");
                mark_dead(&self.health, "dispatch worker panicked");
                WorkerExit::Panicked
            }
        }
    }
}

/// Await the loop task and turn a panic into dead health immediately.
fn supervise(
    inner: JoinHandle<WorkerExit>,
    stats: Arc<Mutex<WorkerStats>>,
    health: Arc<HealthState>,
) -> JoinHandle<WorkerExit> {
    tokio::spawn(async move {
        match inner.await {
            Ok(exit) => exit,
            Err(e) => {
                let lost = lock_stats(&stats).in_flight.take();
                match lost {
                    Some(work_id) => {
                        error!(error = %e, %work_id, "dispatch worker task died, in-flight item lost")
                    }
                    None => error!(error = %e, "dispatch worker task died"),
                }
                mark_dead(&health, "dispatch worker panicked");
                WorkerExit::Panicked
            }
        }
    })
}

/// Map a finished job task onto a dispatch outcome.
fn classify(
    tag: &JobTag,
    res: std::result::Result<std::result::Result<(), TaskFailure>, JoinError>,
) -> Dispatched {
    match res {
        Ok(Ok(())) => Dispatched::Succeeded,
        Ok(Err(TaskFailure::Construct(e))) => Dispatched::ConstructionFailed(e),
        Ok(Err(TaskFailure::Run(Error::Cancelled))) => Dispatched::Cancelled,
        Ok(Err(TaskFailure::Run(e @ Error::JobExecution { .. }))) => Dispatched::Failed(e),
        Ok(Err(TaskFailure::Run(e))) => Dispatched::Failed(Error::JobExecution {
            tag: tag.to_string(),
            reason: e.to_string(),
        }),
        Err(join_err) => Dispatched::Failed(Error::JobExecution {
            tag: tag.to_string(),
            reason: join_failure(join_err),
        }),
    }
}

fn mark_dead(health: &HealthState, reason: &str) {
    health
        .liveness
        .set(ProbeStatus::Unhealthy, Some(reason.to_string()));
    health
        .readiness
        .set(ProbeStatus::Unhealthy, Some(reason.to_string()));
}

fn lock_stats(stats: &Mutex<WorkerStats>) -> std::sync::MutexGuard<'_, WorkerStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

fn join_failure(err: JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        format!("panicked: {msg}")
    } else {
        err.to_string()
    }
}

/// Convenience for callers that only need to know whether shutdown was clean.
impl WorkerExit {
    pub fn into_result(self) -> Result<()> {
        match self {
            WorkerExit::Clean => Ok(()),
            WorkerExit::Interrupted { .. } => Err(Error::Other(
                "dispatch worker interrupted an in-flight job".into(),
            )),
            WorkerExit::Panicked => Err(Error::Other("dispatch worker panicked".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_failure(e: Error) -> std::result::Result<std::result::Result<(), TaskFailure>, JoinError> {
        Ok(Err(TaskFailure::Run(e)))
    }

    #[test]
    fn run_errors_become_job_execution() {
        let tag = JobTag::new("reconcile");
        match classify(&tag, run_failure(Error::Other("boom".into()))) {
            Dispatched::Failed(Error::JobExecution { tag, reason }) => {
                assert_eq!(tag, "reconcile");
                assert_eq!(reason, "boom");
            }
            _ => panic!("expected a JobExecution failure"),
        }
    }

    #[test]
    fn cancellation_is_its_own_outcome() {
        let outcome = classify(&JobTag::new("reconcile"), run_failure(Error::Cancelled));
        assert!(matches!(outcome, Dispatched::Cancelled));
        assert_eq!(outcome.label(), "cancelled");
    }

    #[test]
    fn construction_errors_pass_through() {
        let res = Ok(Err(TaskFailure::Construct(Error::UnknownJobType("x".into()))));
        assert!(matches!(
            classify(&JobTag::new("x"), res),
            Dispatched::ConstructionFailed(Error::UnknownJobType(_))
        ));
    }

    #[tokio::test]
    async fn dead_loop_marks_health_without_join() {
        let health = Arc::new(HealthState::new());
        health.liveness.set(ProbeStatus::Healthy, None);
        health.readiness.set(ProbeStatus::Healthy, None);
        let stats = Arc::new(Mutex::new(WorkerStats {
            in_flight: Some(WorkId::new()),
            ..Default::default()
        }));

        let inner = tokio::spawn(async {
            if true {
                panic!("loop blew up");
            }
            WorkerExit::Clean
        });
        let watcher = supervise(inner, Arc::clone(&stats), Arc::clone(&health));

        let deadline = Instant::now() + Duration::from_secs(5);
        while health.liveness.status() != ProbeStatus::Unhealthy {
            assert!(Instant::now() < deadline, "liveness never went unhealthy");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(health.readiness.status(), ProbeStatus::Unhealthy);
        assert!(lock_stats(&stats).in_flight.is_none());
        assert_eq!(watcher.await.unwrap(), WorkerExit::Panicked);
    }
}
