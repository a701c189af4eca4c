//! Error types for homefin-dispatch.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("dispatch queue is full ({max_length} pending)")]
    CapacityExceeded { max_length: usize },

    #[error("no job registered for type {0:?}")]
    UnknownJobType(String),

    #[error("could not construct job {tag:?}: {reason}")]
    JobConstruction { tag: String, reason: String },

    #[error("job {tag:?} failed: {reason}")]
    JobExecution { tag: String, reason: String },

    #[error("job cancelled")]
    Cancelled,

    #[error("in-flight job ignored cancellation for {grace:?}")]
    ShutdownInterrupted { grace: Duration },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures the dispatch worker treats as "job could not be built".
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Error::UnknownJobType(_) | Error::JobConstruction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
