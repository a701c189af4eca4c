//! Health facets consumed by orchestrator probes.
//!
//! Three independent cells: startup, liveness and readiness. Each holds a
//! status, an optional message and the time it was last written. Writes
//! replace the whole reading under a mutex so a reader never sees a status
//! paired with another write's message. Only the dispatch worker writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

/// Status of the startup probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupStatus {
    Unknown,
    Degraded,
    Healthy,
}

/// Status of the liveness and readiness probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Unknown,
    Degraded,
    Healthy,
    Unhealthy,
}

/// One snapshot of a health cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReading<S> {
    pub status: S,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl<S> HealthReading<S> {
    /// Time since the reading was written. Watchdogs compare this against
    /// their own staleness budget.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.updated_at
    }
}

/// A lock-guarded status cell.
#[derive(Debug)]
pub struct HealthCell<S> {
    reading: Mutex<HealthReading<S>>,
}

impl<S: Copy> HealthCell<S> {
    pub fn new(status: S) -> Self {
        Self {
            reading: Mutex::new(HealthReading {
                status,
                message: None,
                updated_at: Utc::now(),
            }),
        }
    }

    pub fn get(&self) -> HealthReading<S> {
        self.reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> S {
        self.reading
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub(crate) fn set(&self, status: S, message: Option<String>) {
        let next = HealthReading {
            status,
            message,
            updated_at: Utc::now(),
        };
        *self.reading.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Named health checks exposed to the probe endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Startup,
    Liveness,
    Readiness,
}

impl FromStr for CheckKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "startup" => Ok(Self::Startup),
            "liveness" => Ok(Self::Liveness),
            "readiness" => Ok(Self::Readiness),
            other => Err(format!("unknown health check: {other}")),
        }
    }
}

/// Result of polling one named check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckReport {
    pub check: CheckKind,
    /// Startup readings are widened into the probe vocabulary.
    pub status: ProbeStatus,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CheckReport {
    /// Whether an orchestrator should treat the check as passing.
    pub fn is_passing(&self) -> bool {
        self.status == ProbeStatus::Healthy
    }
}

/// Snapshot of all three facets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub startup: HealthReading<StartupStatus>,
    pub liveness: HealthReading<ProbeStatus>,
    pub readiness: HealthReading<ProbeStatus>,
}

/// Process-wide health state, shared by the worker and the probe endpoint.
#[derive(Debug)]
pub struct HealthState {
    pub startup: HealthCell<StartupStatus>,
    pub liveness: HealthCell<ProbeStatus>,
    pub readiness: HealthCell<ProbeStatus>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// All cells start degraded until the worker reports in.
    pub fn new() -> Self {
        Self {
            startup: HealthCell::new(StartupStatus::Degraded),
            liveness: HealthCell::new(ProbeStatus::Degraded),
            readiness: HealthCell::new(ProbeStatus::Degraded),
        }
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            startup: self.startup.get(),
            liveness: self.liveness.get(),
            readiness: self.readiness.get(),
        }
    }

    /// Poll a single named check.
    pub fn check(&self, kind: CheckKind) -> CheckReport {
        let (status, message, updated_at) = match kind {
            CheckKind::Startup => {
                let r = self.startup.get();
                (startup_as_probe(r.status), r.message, r.updated_at)
            }
            CheckKind::Liveness => {
                let r = self.liveness.get();
                (r.status, r.message, r.updated_at)
            }
            CheckKind::Readiness => {
                let r = self.readiness.get();
                (r.status, r.message, r.updated_at)
            }
        };
        CheckReport {
            check: kind,
            status,
            message,
            updated_at,
        }
    }
}

fn startup_as_probe(status: StartupStatus) -> ProbeStatus {
    match status {
        StartupStatus::Unknown => ProbeStatus::Unknown,
        StartupStatus::Degraded => ProbeStatus::Degraded,
        StartupStatus::Healthy => ProbeStatus::Healthy,
    }
}
