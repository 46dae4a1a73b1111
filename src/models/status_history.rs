use crate::state_machine::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One row of the append-only status history. Never mutated or deleted; this
/// is the audit trail and the source of truth for the order's current state,
/// decoupled from the possibly-racy materialized column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub order_id: i64,
    pub new_status: OrderStatus,
    pub previous_status: Option<OrderStatus>,
    /// Contextual blob: prep time, rejection reason, rider info, payment
    /// details, whatever the transition carried.
    pub metadata: Value,
    /// Which processor wrote the row (`orchestrator`, `timeout_processor`, ...).
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

impl OrderStatusHistory {
    pub fn new(
        order_id: i64,
        new_status: OrderStatus,
        previous_status: Option<OrderStatus>,
        metadata: Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            new_status,
            previous_status,
            metadata,
            source: source.into(),
            recorded_at: Utc::now(),
        }
    }
}
