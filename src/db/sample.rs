//! Sample household data, written in a single transaction.
//!
//! Fresh identifier ranges are allocated from the current table maxima
//! while the tables are locked, so repeated seeding appends a new block of
//! rows instead of colliding with earlier ones. Nothing is visible to other
//! sessions until the final commit; bailing out early drops the transaction.

use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const CATEGORIES: &[(&str, &str)] = &[
    ("Salary", "income"),
    ("Groceries", "expense"),
    ("Utilities", "expense"),
    ("Rent", "expense"),
    ("Dining out", "expense"),
];

const ACCOUNTS: &[(&str, &str, i64)] = &[
    ("Household checking", "checking", 250_000),
    ("Rainy day savings", "savings", 1_000_000),
    ("Shared credit card", "credit", 0),
];

/// (account index, category index, amount in cents, description, days ago)
const TRANSACTIONS: &[(usize, usize, i64, &str, i64)] = &[
    (0, 0, 420_000, "Monthly salary", 28),
    (0, 3, -150_000, "Rent", 27),
    (2, 1, -8_734, "Weekly groceries", 21),
    (0, 2, -6_210, "Electricity bill", 18),
    (2, 1, -9_102, "Weekly groceries", 14),
    (2, 4, -4_650, "Pizza night", 10),
    (2, 1, -7_988, "Weekly groceries", 7),
    (1, 0, 50_000, "Savings transfer in", 3),
];

/// Ranges of ids written by one seeding run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub first_category_id: i32,
    pub categories: usize,
    pub first_account_id: i32,
    pub accounts: usize,
    pub first_transaction_id: i64,
    pub transactions: usize,
}

impl super::Db {
    /// Insert the sample data set. Checks `cancel` between steps; once the
    /// commit starts the run is no longer cancellable.
    pub async fn seed_sample_data(&self, cancel: &CancellationToken) -> Result<SeedSummary> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("LOCK TABLE categories, accounts, transactions IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;
        checkpoint(cancel)?;

        let first_category_id = next_id(&mut tx, "categories").await? as i32;
        for (offset, (name, kind)) in CATEGORIES.iter().enumerate() {
            sqlx::query("INSERT INTO categories (id, name, kind) VALUES ($1, $2, $3)")
                .bind(first_category_id + offset as i32)
                .bind(*name)
                .bind(*kind)
                .execute(&mut *tx)
                .await?;
        }
        debug!(first_category_id, count = CATEGORIES.len(), "sample categories staged");
        checkpoint(cancel)?;

        let first_account_id = next_id(&mut tx, "accounts").await? as i32;
        for (offset, (name, kind, opening)) in ACCOUNTS.iter().enumerate() {
            sqlx::query(
                "INSERT INTO accounts (id, name, kind, opening_balance_cents) VALUES ($1, $2, $3, $4)",
            )
            .bind(first_account_id + offset as i32)
            .bind(*name)
            .bind(*kind)
            .bind(*opening)
            .execute(&mut *tx)
            .await?;
        }
        debug!(first_account_id, count = ACCOUNTS.len(), "sample accounts staged");
        checkpoint(cancel)?;

        let first_transaction_id = next_id(&mut tx, "transactions").await?;
        let today = Utc::now().date_naive();
        for (offset, (account, category, amount, description, days_ago)) in
            TRANSACTIONS.iter().enumerate()
        {
            sqlx::query(
                "INSERT INTO transactions (id, account_id, category_id, amount_cents, description, occurred_on)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(first_transaction_id + offset as i64)
            .bind(first_account_id + *account as i32)
            .bind(first_category_id + *category as i32)
            .bind(*amount)
            .bind(*description)
            .bind(today - Duration::days(*days_ago))
            .execute(&mut *tx)
            .await?;
        }
        debug!(first_transaction_id, count = TRANSACTIONS.len(), "sample transactions staged");
        checkpoint(cancel)?;

        tx.commit().await?;

        Ok(SeedSummary {
            first_category_id,
            categories: CATEGORIES.len(),
            first_account_id,
            accounts: ACCOUNTS.len(),
            first_transaction_id,
            transactions: TRANSACTIONS.len(),
        })
    }

    /// Row counts for the sample tables, in (categories, accounts, transactions) order.
    pub async fn sample_counts(&self) -> Result<(i64, i64, i64)> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM categories),
                    (SELECT COUNT(*) FROM accounts),
                    (SELECT COUNT(*) FROM transactions)",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Next free id for a table. Table names come from this module only.
async fn next_id(tx: &mut Transaction<'_, Postgres>, table: &str) -> Result<i64> {
    let sql = format!("SELECT COALESCE(MAX(id)::BIGINT, 0) + 1 FROM {table}");
    let row: (i64,) = sqlx::query_as(&sql).fetch_one(&mut **tx).await?;
    Ok(row.0)
}
