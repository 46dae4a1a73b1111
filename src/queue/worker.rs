//! Polling worker that drains the delayed job queue and dispatches to
//! registered handlers by job type.

use super::{DelayedJobQueue, JobHandler, JobOutcome, QueueResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

pub struct JobWorker {
    queue: Arc<dyn DelayedJobQueue>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
    batch_size: i64,
}

impl JobWorker {
    pub fn new(queue: Arc<dyn DelayedJobQueue>, poll_interval: Duration, batch_size: i64) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            poll_interval,
            batch_size,
        }
    }

    /// Register a handler for every job type it declares. Last registration
    /// wins on overlap.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        for job_type in handler.job_types() {
            self.handlers.insert(job_type, handler.clone());
        }
    }

    /// Drain one batch of due jobs. Returns how many jobs were processed.
    /// Exposed separately from [`run`](Self::run) so tests can step the queue
    /// deterministically.
    pub async fn run_once(&self) -> QueueResult<usize> {
        let jobs = self.queue.due_jobs(self.batch_size).await?;
        let count = jobs.len();

        for job in jobs {
            let Some(handler) = self.handlers.get(job.job_type.as_str()) else {
                warn!(job_id = job.id, job_type = %job.job_type, "no handler registered");
                if let JobOutcome::Dead = self.queue.fail(job.id, "no handler registered").await? {
                    debug!(job_id = job.id, "unhandled job went dead");
                }
                continue;
            };

            match handler.handle(&job).await {
                Ok(()) => {
                    self.queue.complete(job.id).await?;
                    debug!(job_id = job.id, job_type = %job.job_type, "job completed");
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(
                        job_id = job.id,
                        job_type = %job.job_type,
                        attempt = job.attempt + 1,
                        error = %message,
                        "job failed"
                    );
                    if let JobOutcome::Dead = self.queue.fail(job.id, &message).await? {
                        // Exactly one exhaustion callback per job lifetime.
                        handler.on_exhausted(&job, &message).await;
                    }
                }
            }
        }

        Ok(count)
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        error!(error = %err, "queue poll failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("job worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}
