//! # orderflow-core
//!
//! Post-payment order lifecycle orchestration for a food-delivery platform.
//!
//! Once a payment is confirmed, this crate drives the order through vendor
//! confirmation, rider dispatch, pickup, and delivery: a strict status state
//! machine with an append-only history, a durable delayed job queue for
//! timeouts and retries, and best-effort fan-out to the side channels
//! (customer messaging, live tracking, IVR, number masking).
//!
//! ## Architecture
//!
//! - [`state_machine`]: order statuses and the legal-transition table.
//! - [`repository`]: order persistence; history is the source of truth, the
//!   materialized status column is a compare-and-set cache.
//! - [`queue`]: delayed jobs with unique-key dedup, visibility-timeout
//!   leasing, bounded retries, and a dead-letter state.
//! - [`services`]: trait seams for every external collaborator, plus the
//!   [`services::BestEffort`] wrapper for calls that must never block the
//!   workflow.
//! - [`orchestration`]: the [`orchestration::PostPaymentOrchestrator`] entry
//!   points and the two job processors that re-enter it.
//!
//! Both the repository and the queue ship a Postgres backend for production
//! and an in-memory backend with a manual clock for deterministic tests.

pub mod config;
pub mod constants;
pub mod error;
pub mod geo;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod queue;
pub mod repository;
pub mod services;
pub mod state_machine;

pub use config::OrchestratorConfig;
pub use error::{OrchestrationError, Result};
pub use orchestration::{
    OrchestratorDeps, OrderTimeoutProcessor, OrderWorkflow, PostPaymentOrchestrator,
    VendorNotificationProcessor,
};
pub use queue::{DelayedJobQueue, JobHandler, JobWorker, RetryPolicy};
pub use repository::OrderRepository;
pub use state_machine::OrderStatus;
