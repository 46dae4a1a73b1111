//! Order timeout processor.
//!
//! Consumes the workflow's delayed jobs and re-enters the orchestrator when
//! the condition each timer was armed for still holds. An order may have
//! moved on through a different path since a job was scheduled; a job whose
//! precondition no longer holds is cancelled-in-place (logged and completed,
//! never retried).

use crate::constants::job_types;
use crate::error::{OrchestrationError, Result};
use crate::orchestration::callbacks::OrderWorkflow;
use crate::queue::{JobEnvelope, JobHandler};
use crate::repository::OrderRepository;
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct TimeoutPayload {
    order_id: i64,
    #[serde(default = "first_attempt")]
    attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

pub struct OrderTimeoutProcessor {
    repository: Arc<dyn OrderRepository>,
    workflow: Arc<dyn OrderWorkflow>,
}

impl OrderTimeoutProcessor {
    pub fn new(repository: Arc<dyn OrderRepository>, workflow: Arc<dyn OrderWorkflow>) -> Self {
        Self {
            repository,
            workflow,
        }
    }

    async fn current_status(&self, order_id: i64) -> Result<OrderStatus> {
        Ok(self
            .repository
            .current_status(order_id)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl JobHandler for OrderTimeoutProcessor {
    fn job_types(&self) -> &[&'static str] {
        &[
            job_types::VENDOR_REMINDER,
            job_types::VENDOR_ESCALATION,
            job_types::RIDER_SEARCH,
            job_types::RIDER_SEARCH_RETRY,
        ]
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<()> {
        let payload: TimeoutPayload = serde_json::from_value(job.payload.clone())?;
        let order_id = payload.order_id;

        match job.job_type.as_str() {
            job_types::VENDOR_REMINDER => {
                if self.current_status(order_id).await? == OrderStatus::Confirmed {
                    self.workflow.remind_vendor(order_id).await?;
                } else {
                    info!(order_id, "vendor reminder no longer applies, skipping");
                }
            }
            job_types::VENDOR_ESCALATION => {
                if self.current_status(order_id).await? == OrderStatus::Confirmed {
                    self.workflow.escalate_vendor_silence(order_id).await?;
                } else {
                    info!(order_id, "vendor escalation no longer applies, skipping");
                }
            }
            // The orchestrator re-validates on entry; no pre-check here.
            job_types::RIDER_SEARCH => {
                self.workflow
                    .start_rider_search(order_id, payload.attempt)
                    .await?;
            }
            job_types::RIDER_SEARCH_RETRY => {
                if self.current_status(order_id).await? == OrderStatus::SearchingRider {
                    self.workflow
                        .start_rider_search(order_id, payload.attempt)
                        .await?;
                } else {
                    info!(order_id, "rider search retry no longer applies, skipping");
                }
            }
            other => {
                return Err(OrchestrationError::internal(format!(
                    "timeout processor received unexpected job type {other:?}"
                )));
            }
        }

        Ok(())
    }
}
