//! Durable delayed job queue.
//!
//! At-least-once delivery of named job types with scheduled execution,
//! per-job unique keys (so replays cannot duplicate timers), bounded
//! automatic retries with backoff, and a dead state for exhausted jobs so
//! nothing disappears silently.

pub mod memory;
pub mod postgres;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use worker::JobWorker;

use async_trait::async_trait;

/// How long a leased job stays invisible to other workers before it becomes
/// runnable again.
pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {message}")]
    Database { message: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: i64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::database(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Retry schedule for a job. Delays are monotonically non-decreasing and
/// attempts are always bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// One attempt, no retries.
    None,
    Fixed {
        delay_secs: u64,
        max_attempts: u32,
    },
    Exponential {
        base_secs: u64,
        max_delay_secs: u64,
        max_attempts: u32,
    },
}

impl RetryPolicy {
    /// Total handler executions allowed before the job goes dead.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                (*max_attempts).max(1)
            }
        }
    }

    /// Delay before retry number `attempt` (1-based: the delay after the
    /// first failure is `delay_for(1)`).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed { delay_secs, .. } => Duration::from_secs(*delay_secs),
            Self::Exponential {
                base_secs,
                max_delay_secs,
                ..
            } => {
                let shift = attempt.saturating_sub(1).min(32);
                let delay = base_secs.saturating_mul(1u64 << shift);
                Duration::from_secs(delay.min(*max_delay_secs))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Completed,
    /// Retries exhausted; kept for visibility, never silently dropped.
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

/// A scheduled unit of work as stored by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: i64,
    pub job_type: String,
    pub payload: Value,
    pub run_at: DateTime<Utc>,
    pub unique_key: Option<String>,
    /// Handler executions so far.
    pub attempt: u32,
    pub retry: RetryPolicy,
    pub state: JobState,
    pub last_error: Option<String>,
}

/// What happened to a job after [`DelayedJobQueue::fail`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Re-scheduled; will become visible at `next_run_at`.
    Retrying { next_run_at: DateTime<Utc> },
    /// Attempts exhausted; the job is dead and a human-visible escalation is
    /// the caller's responsibility.
    Dead,
}

#[async_trait]
pub trait DelayedJobQueue: Send + Sync {
    /// Schedule a job for `delay` from now. When `unique_key` matches a
    /// still-pending job, the call is a de-duplicated no-op returning the
    /// existing job's id.
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        delay: Duration,
        unique_key: Option<String>,
        retry: RetryPolicy,
    ) -> QueueResult<i64>;

    /// Lease up to `limit` runnable jobs. Leased jobs stay invisible for
    /// [`VISIBILITY_TIMEOUT`], so a crashed worker's jobs resurface.
    async fn due_jobs(&self, limit: i64) -> QueueResult<Vec<JobEnvelope>>;

    /// Mark a job done.
    async fn complete(&self, job_id: i64) -> QueueResult<()>;

    /// Record a failed execution. Re-schedules with the job's backoff while
    /// attempts remain, otherwise marks it dead.
    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<JobOutcome>;
}

/// Consumer of one or more job types, dispatched by the worker.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_types(&self) -> &[&'static str];

    async fn handle(&self, job: &JobEnvelope) -> crate::error::Result<()>;

    /// Called exactly once when a job dies, after its final failed attempt.
    async fn on_exhausted(&self, _job: &JobEnvelope, _error: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let policy = RetryPolicy::Exponential {
            base_secs: 5,
            max_delay_secs: 20,
            max_attempts: 4,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
        // Capped, stays at the max.
        assert_eq!(policy.delay_for(4), Duration::from_secs(20));
        assert_eq!(policy.delay_for(40), Duration::from_secs(20));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = RetryPolicy::Exponential {
            base_secs: 5,
            max_delay_secs: 20,
            max_attempts: 8,
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=8 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= previous, "backoff decreased at attempt {attempt}");
            previous = delay;
        }
    }

    #[test]
    fn test_fixed_policy() {
        let policy = RetryPolicy::Fixed {
            delay_secs: 120,
            max_attempts: 3,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(120));
        assert_eq!(policy.delay_for(3), Duration::from_secs(120));
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_none_policy_single_attempt() {
        assert_eq!(RetryPolicy::None.max_attempts(), 1);
    }

    #[test]
    fn test_retry_policy_serde_round_trip() {
        let policy = RetryPolicy::Exponential {
            base_secs: 5,
            max_delay_secs: 20,
            max_attempts: 4,
        };
        let json = serde_json::to_value(&policy).unwrap();
        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, policy);
    }
}
