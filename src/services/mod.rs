//! External collaborator contracts.
//!
//! Every downstream system the orchestrator touches is behind a narrow
//! async trait: vendor directory, customer/vendor messaging, the tracking
//! system, dispatch lookup, IVR calls, masked numbers, and support alerts.
//! Side channels that must never abort a workflow step go through
//! [`BestEffort::call`], which enforces a timeout, logs structured failure,
//! and returns an `Option`.

use crate::models::{GeoPoint, Order, Rider, Vendor};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

/// Errors surfaced by external collaborators.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },

    #[error("{service} timed out after {timeout_secs}s")]
    Timeout { service: String, timeout_secs: u64 },
}

impl ServiceError {
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn rejected(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            message: message.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// PHP-backend vendor directory lookup.
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn get_vendor(&self, store_id: i64) -> ServiceResult<Vendor>;
}

/// Upstream order API, consulted when an order is not in the local store
/// (e.g. the payment webhook arrives before the order sync did).
#[async_trait]
pub trait OrderDirectory: Send + Sync {
    async fn fetch_order(&self, order_id: i64) -> ServiceResult<Order>;
}

/// Plain-text messaging to a phone number (customer or vendor). Fire and
/// forget at the workflow level; failures are logged, not thrown.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> ServiceResult<()>;
}

/// External live-tracking system. All calls are best-effort HTTP.
#[async_trait]
pub trait TrackingClient: Send + Sync {
    async fn create_order(&self, order: &Order) -> ServiceResult<Uuid>;
    async fn update_status(
        &self,
        correlation_id: Uuid,
        status: OrderStatus,
        fields: Value,
    ) -> ServiceResult<()>;
    async fn update_location(&self, correlation_id: Uuid, lat: f64, lng: f64)
        -> ServiceResult<()>;
}

/// Rider dispatch lookup. `Ok(None)` means the search ran and found nobody.
#[async_trait]
pub trait DispatchClient: Send + Sync {
    async fn find_available_rider(
        &self,
        pickup: GeoPoint,
        drop: GeoPoint,
        order_id: i64,
        amount: f64,
    ) -> ServiceResult<Option<Rider>>;
}

/// Outbound IVR calls. Telephony internals are out of scope; this is the
/// orchestrator's view of them.
#[async_trait]
pub trait IvrClient: Send + Sync {
    /// Call the vendor to confirm (or remind about) a pending order.
    async fn confirm_vendor_order(&self, vendor: &Vendor, order_id: i64) -> ServiceResult<()>;
    /// Call the rider with the assignment details.
    async fn assign_rider(&self, rider: &Rider, order_id: i64) -> ServiceResult<()>;
}

/// Masked/virtual number provisioning for customer<->rider privacy.
/// Optional capability; absence must not block the workflow.
#[async_trait]
pub trait MaskedNumberService: Send + Sync {
    async fn create_masked_number(
        &self,
        party_a: &str,
        party_b: &str,
        ttl: Duration,
    ) -> ServiceResult<Option<String>>;
}

/// High-visibility alert for the ops channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportAlert {
    pub topic: String,
    pub order_id: i64,
    pub summary: String,
    pub details: Value,
    /// Set when retries are exhausted and a human has to pick this up.
    pub requires_manual_intervention: bool,
}

impl SupportAlert {
    pub fn new(topic: &str, order_id: i64, summary: impl Into<String>, details: Value) -> Self {
        Self {
            topic: topic.to_string(),
            order_id,
            summary: summary.into(),
            details,
            requires_manual_intervention: false,
        }
    }

    pub fn manual_intervention(mut self) -> Self {
        self.requires_manual_intervention = true;
        self
    }
}

/// Ops escalation channel. Deliberately not queue-backed: alerts must not
/// share fate with the queue they often report on.
#[async_trait]
pub trait SupportAlerter: Send + Sync {
    async fn alert(&self, alert: SupportAlert) -> ServiceResult<()>;
}

/// Channels a vendor can be reached on for new-order notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Push,
    Chat,
    Voice,
}

impl NotificationChannel {
    pub const ALL: [NotificationChannel; 3] = [Self::Push, Self::Chat, Self::Voice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Chat => "chat",
            Self::Voice => "voice",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one delivery attempt on one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelResult {
    pub channel: NotificationChannel,
    pub success: bool,
    pub error: Option<String>,
}

/// Multi-channel vendor notification delivery.
#[async_trait]
pub trait VendorNotifier: Send + Sync {
    /// Channels configured for this deployment, tried in order.
    fn channels(&self) -> Vec<NotificationChannel> {
        NotificationChannel::ALL.to_vec()
    }

    async fn send(
        &self,
        channel: NotificationChannel,
        vendor: &Vendor,
        order_id: i64,
        summary: &str,
    ) -> ServiceResult<()>;
}

/// Uniform wrapper for side calls whose failure must never abort the
/// surrounding workflow step: enforce a timeout, log, return an `Option`.
#[derive(Debug, Clone, Copy)]
pub struct BestEffort {
    timeout: Duration,
}

impl BestEffort {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn call<T, F>(&self, operation: &'static str, order_id: i64, fut: F) -> Option<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(operation, order_id, error = %err, "best-effort call failed");
                None
            }
            Err(_) => {
                warn!(
                    operation,
                    order_id,
                    timeout_secs = self.timeout.as_secs(),
                    "best-effort call timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_best_effort_returns_value_on_success() {
        let be = BestEffort::new(Duration::from_secs(1));
        let result = be.call("op", 1, async { Ok::<_, ServiceError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let be = BestEffort::new(Duration::from_secs(1));
        let result = be
            .call("op", 1, async {
                Err::<i32, _>(ServiceError::unavailable("tracking", "503"))
            })
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_best_effort_enforces_timeout() {
        let be = BestEffort::new(Duration::from_millis(10));
        let result = be
            .call("op", 1, async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, ServiceError>(1)
            })
            .await;
        assert_eq!(result, None);
    }
}
