//! Crate-level error taxonomy.
//!
//! Domain errors (illegal transition, unknown status) propagate to callers as
//! typed failures. Infrastructure errors from best-effort side channels are
//! caught and logged at the point of use and never abort a workflow step;
//! those paths go through [`crate::services::BestEffort`] and do not appear
//! here.

use thiserror::Error;

use crate::queue::QueueError;
use crate::repository::RepositoryError;
use crate::services::ServiceError;
use crate::state_machine::StateMachineError;

/// Umbrella error for orchestrator entry points and job handlers.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// A non-best-effort service call failed (e.g. the vendor IVR reminder,
    /// which must bubble up so the queue retries it).
    #[error("service call failed: {0}")]
    Service(#[from] ServiceError),

    #[error("payload serialization error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Every configured notification channel failed for this attempt.
    #[error("all vendor notification channels failed for order {order_id}")]
    AllChannelsFailed { order_id: i64 },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal orchestration error: {message}")]
    Internal { message: String },
}

impl OrchestrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestrationError>;
