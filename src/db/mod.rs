//! Postgres access for jobs.
//!
//! The dispatch core never touches the database itself; jobs that need it
//! receive an `Arc<Db>` from the factory that builds them.

pub mod sample;

use crate::error::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::{debug, info};

/// How long a job waits for a pooled connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared connection pool handed to database-backed jobs.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Open a pool of at most `max_connections`. Jobs run one at a time, so
    /// a small pool is enough.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if max_connections == 0 {
            return Err(Error::Config("database pool needs at least one connection".into()));
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        info!(max_connections, "database pool ready");
        Ok(Self { pool })
    }

    /// Apply the embedded household schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    /// Round-trip a trivial query. Jobs call this before taking table locks
    /// so a dead pool fails fast as a job error.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        debug!("database reachable");
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
