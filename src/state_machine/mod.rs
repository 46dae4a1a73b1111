// Order state machine: pure validation of status transitions and alias
// normalization. No I/O, no dependencies on the rest of the crate.

pub mod errors;
pub mod states;
pub mod transitions;

pub use errors::{StateMachineError, StateMachineResult};
pub use states::OrderStatus;
pub use transitions::{
    can_transition, ensure_transition, is_cancellable, is_terminal, successors, transition,
};
