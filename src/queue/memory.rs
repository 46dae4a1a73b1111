//! Deterministic in-memory [`DelayedJobQueue`].
//!
//! Drives the timer-heavy workflow tests: time never moves on its own, the
//! test advances the clock and drains the worker, so "the reminder fires at
//! T+5min" is an exact assertion rather than a sleep.

use super::{
    DelayedJobQueue, JobEnvelope, JobOutcome, JobState, QueueError, QueueResult, RetryPolicy,
    VISIBILITY_TIMEOUT,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    jobs: Vec<JobEnvelope>,
    next_id: i64,
    now: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                jobs: Vec::new(),
                next_id: 1,
                now: Utc::now(),
            }),
        }
    }

    /// The queue's current notion of time.
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.lock().now
    }

    /// Move the clock forward. Jobs whose run_at falls inside the window
    /// become runnable on the next [`DelayedJobQueue::due_jobs`] call.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        inner.now += ChronoDuration::from_std(by).expect("advance duration out of range");
    }

    /// Snapshot of every job the queue has seen, for assertions.
    pub fn jobs(&self) -> Vec<JobEnvelope> {
        self.inner.lock().jobs.clone()
    }

    pub fn pending_jobs(&self) -> Vec<JobEnvelope> {
        self.inner
            .lock()
            .jobs
            .iter()
            .filter(|j| j.state == JobState::Pending)
            .cloned()
            .collect()
    }

    pub fn dead_jobs(&self) -> Vec<JobEnvelope> {
        self.inner
            .lock()
            .jobs
            .iter()
            .filter(|j| j.state == JobState::Dead)
            .cloned()
            .collect()
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelayedJobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        delay: Duration,
        unique_key: Option<String>,
        retry: RetryPolicy,
    ) -> QueueResult<i64> {
        let mut inner = self.inner.lock();

        if let Some(key) = unique_key.as_deref() {
            // Unique keys collide with live jobs only; completed or dead
            // jobs never block re-scheduling.
            if let Some(existing) = inner
                .jobs
                .iter()
                .find(|j| j.state == JobState::Pending && j.unique_key.as_deref() == Some(key))
            {
                return Ok(existing.id);
            }
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let run_at = inner.now
            + ChronoDuration::from_std(delay)
                .map_err(|e| QueueError::database(format!("delay out of range: {e}")))?;
        inner.jobs.push(JobEnvelope {
            id,
            job_type: job_type.to_string(),
            payload,
            run_at,
            unique_key,
            attempt: 0,
            retry,
            state: JobState::Pending,
            last_error: None,
        });
        Ok(id)
    }

    async fn due_jobs(&self, limit: i64) -> QueueResult<Vec<JobEnvelope>> {
        let mut inner = self.inner.lock();
        let now = inner.now;
        let lease = ChronoDuration::from_std(VISIBILITY_TIMEOUT)
            .map_err(|e| QueueError::database(format!("lease out of range: {e}")))?;

        let mut due: Vec<usize> = inner
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| j.state == JobState::Pending && j.run_at <= now)
            .map(|(i, _)| i)
            .collect();
        due.sort_by_key(|&i| inner.jobs[i].run_at);
        due.truncate(limit.max(0) as usize);

        let mut leased = Vec::with_capacity(due.len());
        for i in due {
            let job = &mut inner.jobs[i];
            let snapshot = job.clone();
            job.run_at = now + lease;
            leased.push(snapshot);
        }
        Ok(leased)
    }

    async fn complete(&self, job_id: i64) -> QueueResult<()> {
        let mut inner = self.inner.lock();
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(QueueError::JobNotFound { job_id })?;
        job.state = JobState::Completed;
        Ok(())
    }

    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<JobOutcome> {
        let mut inner = self.inner.lock();
        let now = inner.now;
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(QueueError::JobNotFound { job_id })?;

        job.attempt += 1;
        job.last_error = Some(error.to_string());

        if job.attempt >= job.retry.max_attempts() {
            job.state = JobState::Dead;
            Ok(JobOutcome::Dead)
        } else {
            let delay = ChronoDuration::from_std(job.retry.delay_for(job.attempt))
                .map_err(|e| QueueError::database(format!("backoff out of range: {e}")))?;
            job.run_at = now + delay;
            Ok(JobOutcome::Retrying {
                next_run_at: job.run_at,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_delayed_job_becomes_due_after_advance() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(
                "vendor-reminder",
                json!({"order_id": 1}),
                Duration::from_secs(300),
                None,
                RetryPolicy::None,
            )
            .await
            .unwrap();

        assert!(queue.due_jobs(10).await.unwrap().is_empty());
        queue.advance(Duration::from_secs(299));
        assert!(queue.due_jobs(10).await.unwrap().is_empty());
        queue.advance(Duration::from_secs(1));
        assert_eq!(queue.due_jobs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unique_key_deduplicates_pending_jobs() {
        let queue = MemoryJobQueue::new();
        let first = queue
            .enqueue(
                "vendor-reminder",
                json!({"order_id": 1}),
                Duration::from_secs(300),
                Some("vendor-reminder:1".into()),
                RetryPolicy::None,
            )
            .await
            .unwrap();
        let second = queue
            .enqueue(
                "vendor-reminder",
                json!({"order_id": 1}),
                Duration::from_secs(300),
                Some("vendor-reminder:1".into()),
                RetryPolicy::None,
            )
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(queue.pending_jobs().len(), 1);

        // Once the job is gone, the key is free again.
        queue.complete(first).await.unwrap();
        let third = queue
            .enqueue(
                "vendor-reminder",
                json!({"order_id": 1}),
                Duration::from_secs(300),
                Some("vendor-reminder:1".into()),
                RetryPolicy::None,
            )
            .await
            .unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_leased_job_is_invisible_until_timeout() {
        let queue = MemoryJobQueue::new();
        queue
            .enqueue(
                "rider-search",
                json!({"order_id": 1}),
                Duration::ZERO,
                None,
                RetryPolicy::None,
            )
            .await
            .unwrap();

        assert_eq!(queue.due_jobs(10).await.unwrap().len(), 1);
        // Leased: not visible again immediately.
        assert!(queue.due_jobs(10).await.unwrap().is_empty());
        // Visible again after the lease expires (worker presumed dead).
        queue.advance(VISIBILITY_TIMEOUT);
        assert_eq!(queue.due_jobs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_retries_then_goes_dead() {
        let queue = MemoryJobQueue::new();
        let id = queue
            .enqueue(
                "retry-vendor-notification",
                json!({"order_id": 1}),
                Duration::ZERO,
                None,
                RetryPolicy::Exponential {
                    base_secs: 5,
                    max_delay_secs: 20,
                    max_attempts: 3,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            queue.fail(id, "push down").await.unwrap(),
            JobOutcome::Retrying { .. }
        ));
        assert!(matches!(
            queue.fail(id, "push down").await.unwrap(),
            JobOutcome::Retrying { .. }
        ));
        assert_eq!(queue.fail(id, "push down").await.unwrap(), JobOutcome::Dead);
        assert_eq!(queue.dead_jobs().len(), 1);
        assert_eq!(queue.dead_jobs()[0].attempt, 3);
    }
}
