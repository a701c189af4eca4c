//! Typed configuration from environment variables and TOML.
//!
//! Process config loads once at startup and fails fast if required vars
//! are missing or malformed. The database URL is wrapped in
//! secrecy::SecretString to prevent log leaks. Dispatch tuning can also
//! come from a TOML file; env vars override it.

pub mod secrets;

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_CONNECTIONS: u32 = 5;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Upper bound on pooled Postgres connections.
    pub db_max_connections: u32,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub dispatch: DispatchConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(DispatchConfig::default())
    }

    /// Like [`Config::from_env`], but starts from dispatch settings loaded
    /// elsewhere (typically a TOML file) and applies env overrides on top.
    pub fn from_env_with(dispatch: DispatchConfig) -> Result<Self> {
        let dispatch = dispatch.with_env_overrides()?;
        dispatch.validate()?;
        let db_max_connections =
            optional_parsed::<u32>("DATABASE_MAX_CONNECTIONS")?.unwrap_or(DEFAULT_DB_CONNECTIONS);
        if db_max_connections == 0 {
            return Err(Error::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            db_max_connections,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch,
        })
    }
}

/// Tuning for the dispatch queue and its worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum number of pending work items.
    pub max_length: usize,
    /// How long the worker sleeps when the queue is empty.
    #[serde(rename = "idle_wait_ms", with = "millis")]
    pub idle_wait: Duration,
    /// How long an in-flight job may take to honour cancellation at shutdown.
    #[serde(rename = "shutdown_grace_ms", with = "millis")]
    pub shutdown_grace: Duration,
    /// Fraction of `max_length` at which readiness drops to degraded.
    pub readiness_threshold: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_length: 100,
            idle_wait: Duration::from_millis(250),
            shutdown_grace: Duration::from_secs(10),
            readiness_threshold: 0.8,
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct DispatchFile {
    #[serde(default)]
    dispatch: DispatchConfig,
}

impl DispatchConfig {
    /// Load dispatch settings from the `[dispatch]` table of a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read dispatch config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad dispatch config {}: {e}", path.display())))
    }

    /// Parse dispatch settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: DispatchFile =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        file.dispatch.validate()?;
        Ok(file.dispatch)
    }

    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            return Err(Error::Config("dispatch max_length must be at least 1".into()));
        }
        if self.idle_wait.is_zero() {
            return Err(Error::Config("dispatch idle_wait must be non-zero".into()));
        }
        if !(self.readiness_threshold > 0.0 && self.readiness_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "dispatch readiness_threshold must be in (0, 1], got {}",
                self.readiness_threshold
            )));
        }
        Ok(())
    }

    /// Queue depth at or above which readiness reports degraded.
    pub fn degraded_depth(&self) -> usize {
        let raw = (self.max_length as f64 * self.readiness_threshold).ceil() as usize;
        raw.clamp(1, self.max_length.max(1))
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(n) = optional_parsed::<usize>("DISPATCH_MAX_LENGTH")? {
            self.max_length = n;
        }
        if let Some(ms) = optional_parsed::<u64>("DISPATCH_IDLE_WAIT_MS")? {
            self.idle_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = optional_parsed::<u64>("DISPATCH_SHUTDOWN_GRACE_MS")? {
            self.shutdown_grace = Duration::from_millis(ms);
        }
        if let Some(t) = optional_parsed::<f64>("DISPATCH_READINESS_THRESHOLD")? {
            self.readiness_threshold = t;
        }
        Ok(self)
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
