//! Error types for the order state machine.
//!
//! Domain errors are typed and never auto-corrected: an illegal transition is
//! a logic bug at the call site, an unknown status string is a data-integrity
//! problem in whatever produced it.

use super::states::OrderStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StateMachineError {
    /// Input string did not normalize to any canonical status or alias.
    #[error("unknown order status: {status:?}")]
    UnknownStatus { status: String },

    /// The target status is not reachable from the current one.
    #[error("illegal transition for order {order_id}: {from} -> {to} (allowed: {allowed:?})")]
    IllegalTransition {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
        /// Successors that would have been legal, for diagnostics.
        allowed: Vec<OrderStatus>,
    },
}

impl StateMachineError {
    pub fn unknown_status(status: impl Into<String>) -> Self {
        Self::UnknownStatus {
            status: status.into(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
