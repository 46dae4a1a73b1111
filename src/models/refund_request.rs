use crate::models::order::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record that a refund is owed. This system never executes refunds;
/// it guarantees the request exists and a human was alerted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub order_id: i64,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

impl RefundRequest {
    pub fn new(
        order_id: i64,
        amount: f64,
        payment_method: PaymentMethod,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            amount,
            payment_method,
            reason: reason.into(),
            requested_at: Utc::now(),
        }
    }
}
