//! The fixed order transition table and pure transition validation.
//!
//! This module performs no I/O. Callers persist the result; concurrent
//! writers are reconciled at the repository layer, not here.

use super::errors::{StateMachineError, StateMachineResult};
use super::states::OrderStatus;

use OrderStatus::*;

/// Legal successors for each status. Any pair not listed here is an illegal
/// transition and is rejected, never silently coerced.
///
/// The `rider_assigned`/`on_way_to_pickup` fallback to `searching_rider`
/// models rider-side cancellation without a dedicated status; the shortcut
/// edges (`reached_pickup -> out_for_delivery`, `out_for_delivery ->
/// delivered`) accommodate riders whose apps skip intermediate pings.
pub fn successors(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        Pending => &[Confirmed, Cancelled, Failed],
        Confirmed => &[Preparing, VendorNoResponse, Cancelled, Failed],
        Preparing => &[SearchingRider, Cancelled, Failed],
        VendorNoResponse => &[Preparing, Cancelled, Failed],
        SearchingRider => &[RiderAssigned, Cancelled, Failed],
        RiderAssigned => &[OnWayToPickup, ReachedPickup, SearchingRider, Cancelled, Failed],
        OnWayToPickup => &[ReachedPickup, SearchingRider, Cancelled, Failed],
        ReachedPickup => &[PickedUp, OutForDelivery, Cancelled, Failed],
        PickedUp => &[OutForDelivery, Cancelled, Failed],
        OutForDelivery => &[ReachedDelivery, Delivered, Cancelled, Failed],
        ReachedDelivery => &[Delivered, Failed],
        Delivered => &[],
        Cancelled => &[Refunded],
        Refunded => &[],
        Failed => &[Refunded],
    }
}

/// True when `to` is a legal successor of `from`. Unknown raw strings never
/// reach this function; both sides are already canonical.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    successors(from).contains(&to)
}

/// Validate a transition expressed as raw status strings.
///
/// Normalizes both sides (aliases included), then checks the transition
/// table. Returns the canonical new status on success; the caller is
/// responsible for persisting it.
pub fn transition(
    order_id: i64,
    current: &str,
    next: &str,
) -> StateMachineResult<OrderStatus> {
    let from = OrderStatus::normalize(current)
        .ok_or_else(|| StateMachineError::unknown_status(current))?;
    let to =
        OrderStatus::normalize(next).ok_or_else(|| StateMachineError::unknown_status(next))?;
    ensure_transition(order_id, from, to)
}

/// Transition check over already-canonical statuses.
pub fn ensure_transition(
    order_id: i64,
    from: OrderStatus,
    to: OrderStatus,
) -> StateMachineResult<OrderStatus> {
    if can_transition(from, to) {
        Ok(to)
    } else {
        Err(StateMachineError::IllegalTransition {
            order_id,
            from,
            to,
            allowed: successors(from).to_vec(),
        })
    }
}

/// Terminal when nothing but a refund can follow, or nothing at all.
pub fn is_terminal(status: OrderStatus) -> bool {
    match successors(status) {
        [] => true,
        [only] => *only == Refunded,
        _ => false,
    }
}

/// True while the order can still be cancelled.
pub fn is_cancellable(status: OrderStatus) -> bool {
    successors(status).contains(&Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::states::ALL_STATUSES;

    #[test]
    fn test_full_pair_matrix() {
        // Every pair either matches the table and returns `to`, or is
        // rejected with the allowed-successor list attached.
        for from in ALL_STATUSES {
            for to in ALL_STATUSES {
                let result = transition(1, from.as_str(), to.as_str());
                if successors(from).contains(&to) {
                    assert_eq!(result, Ok(to), "{from} -> {to} should be legal");
                } else {
                    match result {
                        Err(StateMachineError::IllegalTransition { allowed, .. }) => {
                            assert_eq!(allowed, successors(from).to_vec());
                        }
                        other => panic!("{from} -> {to} expected rejection, got {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_transition_normalizes_aliases() {
        assert_eq!(
            transition(7, "accepted", "processing"),
            Ok(OrderStatus::Preparing)
        );
        assert_eq!(
            transition(7, "handover", "pickup_done"),
            Ok(OrderStatus::PickedUp)
        );
    }

    #[test]
    fn test_transition_rejects_unknown_status() {
        assert_eq!(
            transition(7, "bogus", "confirmed"),
            Err(StateMachineError::unknown_status("bogus"))
        );
        assert_eq!(
            transition(7, "confirmed", "nonsense"),
            Err(StateMachineError::unknown_status("nonsense"))
        );
    }

    #[test]
    fn test_rider_fallback_edges() {
        assert!(can_transition(
            OrderStatus::RiderAssigned,
            OrderStatus::SearchingRider
        ));
        assert!(can_transition(
            OrderStatus::OnWayToPickup,
            OrderStatus::SearchingRider
        ));
        assert!(!can_transition(
            OrderStatus::PickedUp,
            OrderStatus::SearchingRider
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(is_terminal(OrderStatus::Delivered));
        assert!(is_terminal(OrderStatus::Refunded));
        assert!(is_terminal(OrderStatus::Cancelled));
        assert!(is_terminal(OrderStatus::Failed));
        assert!(!is_terminal(OrderStatus::RiderAssigned));
        assert!(!is_terminal(OrderStatus::Pending));
    }

    #[test]
    fn test_cancellable_states() {
        assert!(is_cancellable(OrderStatus::Pending));
        assert!(is_cancellable(OrderStatus::OutForDelivery));
        assert!(!is_cancellable(OrderStatus::ReachedDelivery));
        assert!(!is_cancellable(OrderStatus::Delivered));
        assert!(!is_cancellable(OrderStatus::Cancelled));
    }
}
