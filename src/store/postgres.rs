//! Postgres-backed store.
//!
//! One row per key in `job_locks`. Each primitive is a single statement or a
//! short transaction holding a row lock, so every primitive is atomic with
//! respect to every other worker talking to the same database.

use opentelemetry::KeyValue;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::{FencedStore, Store};
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Store handle. Owns the connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (shared with the host application).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// All keys starting with `prefix`, with their values, ordered by key.
    pub async fn scan(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        record("scan");
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM job_locks WHERE starts_with(key, $1) ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

impl Store for PgStore {
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        record("set_if_absent");
        let rows_affected = sqlx::query(
            "INSERT INTO job_locks (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        record("get");
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM job_locks WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn get_and_replace(&self, key: &str, value: &str) -> Result<Option<String>> {
        record("get_and_replace");
        let mut tx = self.pool.begin().await?;

        loop {
            // Row lock: concurrent replacers queue here and each sees the
            // value the previous one committed.
            let prior: Option<(String,)> =
                sqlx::query_as("SELECT value FROM job_locks WHERE key = $1 FOR UPDATE")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;

            if let Some((prior,)) = prior {
                sqlx::query("UPDATE job_locks SET value = $2, updated_at = now() WHERE key = $1")
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                return Ok(Some(prior));
            }

            let inserted = sqlx::query(
                "INSERT INTO job_locks (key, value) VALUES ($1, $2)
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 1 {
                tx.commit().await?;
                return Ok(None);
            }
            // A concurrent insert won; the row exists now. Lock it and retry.
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        record("delete");
        sqlx::query("DELETE FROM job_locks WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl FencedStore for PgStore {
    async fn compare_and_swap(&self, key: &str, expected: &str, value: &str) -> Result<bool> {
        record("compare_and_swap");
        let rows_affected = sqlx::query(
            "UPDATE job_locks SET value = $3, updated_at = now() WHERE key = $1 AND value = $2",
        )
        .bind(key)
        .bind(expected)
        .bind(value)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        record("compare_and_delete");
        let rows_affected = sqlx::query("DELETE FROM job_locks WHERE key = $1 AND value = $2")
            .bind(key)
            .bind(expected)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected == 1)
    }
}

fn record(operation: &'static str) {
    metrics::store_operations().add(1, &[KeyValue::new("operation", operation)]);
}
