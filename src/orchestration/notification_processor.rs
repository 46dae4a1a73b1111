//! Vendor notification retry processor.
//!
//! Consumes `retry-vendor-notification` jobs. Any single channel success
//! completes the job; a clean sweep of failures re-queues through the
//! queue's native backoff, and the dead-letter hook emits exactly one
//! escalation alert. This is the last line of defense against silently
//! unfulfilled orders.

use crate::constants::{alert_topics, job_types};
use crate::error::{OrchestrationError, Result};
use crate::models::Vendor;
use crate::queue::{JobEnvelope, JobHandler};
use crate::services::{ChannelResult, SupportAlert, SupportAlerter, VendorNotifier};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Job payload: everything needed to retry without further lookups, plus
/// the channel results of the attempt that enqueued it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorNotificationPayload {
    pub order_id: i64,
    pub vendor: Vendor,
    pub summary: String,
    pub attempt: u32,
    pub failed_channels: Vec<ChannelResult>,
}

/// Try every configured channel once, in order. Never short-circuits on
/// failure; the caller decides what a partial success means.
pub async fn attempt_all_channels(
    notifier: &dyn VendorNotifier,
    vendor: &Vendor,
    order_id: i64,
    summary: &str,
) -> Vec<ChannelResult> {
    let mut results = Vec::new();
    for channel in notifier.channels() {
        let outcome = notifier.send(channel, vendor, order_id, summary).await;
        match outcome {
            Ok(()) => results.push(ChannelResult {
                channel,
                success: true,
                error: None,
            }),
            Err(err) => {
                warn!(order_id, channel = %channel, error = %err, "vendor notification channel failed");
                results.push(ChannelResult {
                    channel,
                    success: false,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    results
}

pub struct VendorNotificationProcessor {
    notifier: Arc<dyn VendorNotifier>,
    alerter: Arc<dyn SupportAlerter>,
}

impl VendorNotificationProcessor {
    pub fn new(notifier: Arc<dyn VendorNotifier>, alerter: Arc<dyn SupportAlerter>) -> Self {
        Self { notifier, alerter }
    }
}

#[async_trait]
impl JobHandler for VendorNotificationProcessor {
    fn job_types(&self) -> &[&'static str] {
        &[job_types::RETRY_VENDOR_NOTIFICATION]
    }

    async fn handle(&self, job: &JobEnvelope) -> Result<()> {
        let payload: VendorNotificationPayload = serde_json::from_value(job.payload.clone())?;
        let results = attempt_all_channels(
            self.notifier.as_ref(),
            &payload.vendor,
            payload.order_id,
            &payload.summary,
        )
        .await;

        let succeeded: Vec<_> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.channel)
            .collect();

        if succeeded.is_empty() {
            Err(OrchestrationError::AllChannelsFailed {
                order_id: payload.order_id,
            })
        } else {
            info!(
                order_id = payload.order_id,
                channels = ?succeeded,
                retry_attempt = job.attempt + 1,
                "vendor notification delivered on retry"
            );
            Ok(())
        }
    }

    async fn on_exhausted(&self, job: &JobEnvelope, error: &str) {
        let Ok(payload) =
            serde_json::from_value::<VendorNotificationPayload>(job.payload.clone())
        else {
            error!(job_id = job.id, "dead vendor notification job has unreadable payload");
            return;
        };

        let alert = SupportAlert::new(
            alert_topics::VENDOR_UNREACHABLE,
            payload.order_id,
            format!(
                "vendor {} unreachable for order #{} after {} attempts",
                payload.vendor.name,
                payload.order_id,
                job.attempt + 1
            ),
            json!({
                "vendor_id": payload.vendor.id,
                "vendor_phone": payload.vendor.phone,
                "failure_reason": error,
            }),
        )
        .manual_intervention();

        if let Err(alert_err) = self.alerter.alert(alert).await {
            error!(
                order_id = payload.order_id,
                error = %alert_err,
                "failed to escalate unreachable vendor"
            );
        }
    }
}
