//! Reference job: seed the household tables with sample data.

use super::{Job, JobType};
use crate::db::Db;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct SeedSampleData {
    db: Arc<Db>,
}

impl SeedSampleData {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }
}

impl JobType for SeedSampleData {
    const TAG: &'static str = "seed-sample-data";
}

#[async_trait]
impl Job for SeedSampleData {
    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.db.health_check().await?;
        let summary = self.db.seed_sample_data(&cancel).await?;
        info!(
            first_category_id = summary.first_category_id,
            first_account_id = summary.first_account_id,
            first_transaction_id = summary.first_transaction_id,
            transactions = summary.transactions,
            "sample data seeded"
        );
        Ok(())
    }
}
