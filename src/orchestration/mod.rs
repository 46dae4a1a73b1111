//! Post-payment workflow: the orchestrator plus the queue-backed processors
//! that re-enter it.

pub mod callbacks;
pub mod notification_processor;
pub mod orchestrator;
pub mod timeout_processor;

pub use callbacks::OrderWorkflow;
pub use notification_processor::{
    attempt_all_channels, VendorNotificationPayload, VendorNotificationProcessor,
};
pub use orchestrator::{OrchestratorDeps, PostPaymentOrchestrator};
pub use timeout_processor::OrderTimeoutProcessor;
