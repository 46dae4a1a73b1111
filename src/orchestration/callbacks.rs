//! Workflow re-entry points consumed by the queue-backed processors.
//!
//! The timeout processor needs to call back into the orchestrator, and the
//! orchestrator owns the queue the processor drains. Breaking that cycle at
//! a trait boundary keeps construction simple: the orchestrator implements
//! [`OrderWorkflow`] and is registered with the worker at startup.

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait OrderWorkflow: Send + Sync {
    /// Nudge a vendor who has not responded to a confirmed order.
    /// Errors propagate so the queue's retry machinery governs reattempts.
    async fn remind_vendor(&self, order_id: i64) -> Result<()>;

    /// Give up on the vendor: alert ops and mark the order
    /// `vendor_no_response`.
    async fn escalate_vendor_silence(&self, order_id: i64) -> Result<()>;

    /// Enter (or re-enter) the rider search. `attempt` is 1-based; the
    /// orchestrator re-validates the order's status on every entry.
    async fn start_rider_search(&self, order_id: i64, attempt: u32) -> Result<()>;
}
