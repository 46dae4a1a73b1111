//! sqlx/Postgres implementation of [`DelayedJobQueue`].
//!
//! Single `orderflow_jobs` table. De-duplication is a partial unique index
//! over pending jobs; leasing pushes `run_at` forward by the visibility
//! timeout under `FOR UPDATE SKIP LOCKED`, so concurrent workers never
//! double-lease and a crashed worker's jobs resurface on their own.

use super::{
    DelayedJobQueue, JobEnvelope, JobOutcome, JobState, QueueError, QueueResult, RetryPolicy,
    VISIBILITY_TIMEOUT,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> QueueResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orderflow_jobs (
                id BIGSERIAL PRIMARY KEY,
                job_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                run_at TIMESTAMPTZ NOT NULL,
                unique_key TEXT,
                attempt INT NOT NULL DEFAULT 0,
                retry JSONB NOT NULL,
                state TEXT NOT NULL DEFAULT 'pending',
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_orderflow_jobs_unique_pending
            ON orderflow_jobs (unique_key)
            WHERE state = 'pending' AND unique_key IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_orderflow_jobs_due
            ON orderflow_jobs (run_at)
            WHERE state = 'pending'
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn envelope_from_row(row: &sqlx::postgres::PgRow) -> QueueResult<JobEnvelope> {
    let state_raw: String = row.try_get("state")?;
    let state = match state_raw.as_str() {
        "pending" => JobState::Pending,
        "completed" => JobState::Completed,
        "dead" => JobState::Dead,
        other => return Err(QueueError::database(format!("unknown job state {other:?}"))),
    };
    let retry: Value = row.try_get("retry")?;
    Ok(JobEnvelope {
        id: row.try_get("id")?,
        job_type: row.try_get("job_type")?,
        payload: row.try_get("payload")?,
        run_at: row.try_get::<DateTime<Utc>, _>("run_at")?,
        unique_key: row.try_get("unique_key")?,
        attempt: row.try_get::<i32, _>("attempt")? as u32,
        retry: serde_json::from_value(retry)?,
        state,
        last_error: row.try_get("last_error")?,
    })
}

#[async_trait]
impl DelayedJobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        delay: Duration,
        unique_key: Option<String>,
        retry: RetryPolicy,
    ) -> QueueResult<i64> {
        let retry_json = serde_json::to_value(&retry)?;
        let delay_secs = delay.as_secs_f64();

        let inserted = sqlx::query(
            r#"
            INSERT INTO orderflow_jobs (job_type, payload, run_at, unique_key, retry)
            VALUES ($1, $2, now() + ($3 * interval '1 second'), $4, $5)
            ON CONFLICT (unique_key) WHERE state = 'pending' AND unique_key IS NOT NULL
            DO NOTHING
            RETURNING id
            "#,
        )
        .bind(job_type)
        .bind(&payload)
        .bind(delay_secs)
        .bind(&unique_key)
        .bind(&retry_json)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.try_get("id")?);
        }

        // Duplicate of a live job: return the existing timer's id.
        let key = unique_key
            .ok_or_else(|| QueueError::database("insert returned no row without unique_key"))?;
        let row = sqlx::query(
            "SELECT id FROM orderflow_jobs WHERE unique_key = $1 AND state = 'pending'",
        )
        .bind(&key)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn due_jobs(&self, limit: i64) -> QueueResult<Vec<JobEnvelope>> {
        let rows = sqlx::query(
            r#"
            UPDATE orderflow_jobs
            SET run_at = now() + ($2 * interval '1 second'), updated_at = now()
            WHERE id IN (
                SELECT id FROM orderflow_jobs
                WHERE state = 'pending' AND run_at <= now()
                ORDER BY run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, job_type, payload, run_at, unique_key, attempt, retry, state, last_error
            "#,
        )
        .bind(limit)
        .bind(VISIBILITY_TIMEOUT.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(envelope_from_row).collect()
    }

    async fn complete(&self, job_id: i64) -> QueueResult<()> {
        let result = sqlx::query(
            "UPDATE orderflow_jobs SET state = 'completed', updated_at = now() WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotFound { job_id });
        }
        Ok(())
    }

    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<JobOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT attempt, retry FROM orderflow_jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(QueueError::JobNotFound { job_id })?;

        let attempt = row.try_get::<i32, _>("attempt")? as u32 + 1;
        let retry: RetryPolicy = serde_json::from_value(row.try_get::<Value, _>("retry")?)?;

        let outcome = if attempt >= retry.max_attempts() {
            sqlx::query(
                r#"
                UPDATE orderflow_jobs
                SET state = 'dead', attempt = $2, last_error = $3, updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(attempt as i32)
            .bind(error)
            .execute(&mut *tx)
            .await?;
            JobOutcome::Dead
        } else {
            let delay = retry.delay_for(attempt);
            sqlx::query(
                r#"
                UPDATE orderflow_jobs
                SET attempt = $2, last_error = $3,
                    run_at = now() + ($4 * interval '1 second'), updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(attempt as i32)
            .bind(error)
            .bind(delay.as_secs_f64())
            .execute(&mut *tx)
            .await?;
            JobOutcome::Retrying {
                next_run_at: Utc::now()
                    + chrono::Duration::from_std(delay)
                        .map_err(|e| QueueError::database(format!("backoff out of range: {e}")))?,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}
