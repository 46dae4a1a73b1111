//! Order persistence.
//!
//! The append-only status history is the source of truth for "what actually
//! happened"; the order row's `status` column is a materialized view guarded
//! by a compare-and-set so a stale writer cannot clobber a newer one. This
//! event-sourced split is what lets a timeout job and a webhook callback race
//! on the same order and still converge.

pub mod memory;
pub mod postgres;

use crate::models::{Order, OrderStatusHistory, RefundRequest, Rider};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryOrderRepository;
pub use postgres::PgOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("order not found: {order_id}")]
    NotFound { order_id: i64 },

    #[error("database error: {message}")]
    Database { message: String },

    #[error("corrupt persisted state for order {order_id}: {message}")]
    CorruptState { order_id: i64, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RepositoryError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn corrupt_state(order_id: i64, message: impl Into<String>) -> Self {
        Self::CorruptState {
            order_id,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::database(err.to_string())
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Typed persistence surface for the orchestrator. Exposes only append and
/// compare-and-set operations for status; no dynamic field lists, no raw SQL
/// at call sites.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_order(&self, order: &Order) -> RepositoryResult<()>;

    async fn get_order(&self, order_id: i64) -> RepositoryResult<Order>;

    /// Current status derived from the append-only history. `None` when no
    /// transition has been recorded yet (callers treat that as the order's
    /// initial `pending`).
    async fn current_status(&self, order_id: i64) -> RepositoryResult<Option<OrderStatus>>;

    /// Full history in order of occurrence.
    async fn history(&self, order_id: i64) -> RepositoryResult<Vec<OrderStatusHistory>>;

    /// Append one transition row. Never updates or deletes existing rows.
    async fn append_history(&self, entry: OrderStatusHistory) -> RepositoryResult<()>;

    /// Guarded update of the materialized status column: applies only while
    /// the column still holds `expected`. Returns whether the write landed;
    /// `false` means a newer writer got there first, which is not an error.
    async fn compare_and_set_status(
        &self,
        order_id: i64,
        expected: OrderStatus,
        new_status: OrderStatus,
    ) -> RepositoryResult<bool>;

    async fn set_rider(&self, order_id: i64, rider: &Rider) -> RepositoryResult<()>;

    async fn set_tracking_id(&self, order_id: i64, tracking_id: Uuid) -> RepositoryResult<()>;

    /// Durably record that a refund is owed. Append-only; refund execution
    /// happens elsewhere.
    async fn record_refund_request(&self, request: &RefundRequest) -> RepositoryResult<()>;

    async fn refund_requests(&self, order_id: i64) -> RepositoryResult<Vec<RefundRequest>>;
}
