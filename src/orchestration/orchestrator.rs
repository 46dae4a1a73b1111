//! The post-payment workflow driver.
//!
//! Stateless between calls: every entry point re-reads the order, decides
//! the next action, and persists the result. Correctness under concurrent
//! entry (timeout job racing a webhook racing a location ping) rests on the
//! append-only history as ground truth, compare-and-set writes to the
//! materialized status column, and precondition re-checks at every entry.

use crate::config::OrchestratorConfig;
use crate::constants::{alert_topics, job_keys, job_types, sources};
use crate::error::Result;
use crate::geo::haversine_distance_m;
use crate::models::{
    GeoPoint, Order, OrderStatusHistory, PaymentConfirmation, RefundRequest, RejectionReason,
    Rider, VendorResponse,
};
use crate::orchestration::callbacks::OrderWorkflow;
use crate::orchestration::notification_processor::{
    attempt_all_channels, VendorNotificationPayload,
};
use crate::queue::{DelayedJobQueue, RetryPolicy};
use crate::repository::{OrderRepository, RepositoryError};
use crate::services::{
    BestEffort, DispatchClient, IvrClient, MaskedNumberService, Messenger, OrderDirectory,
    SupportAlert, SupportAlerter, TrackingClient, VendorDirectory, VendorNotifier,
};
use crate::state_machine::{ensure_transition, OrderStatus};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Timer jobs get a few fixed-delay reattempts of their own; the real retry
/// logic (reminder windows, search attempts) lives in the workflow.
const TIMER_JOB_RETRY: RetryPolicy = RetryPolicy::Fixed {
    delay_secs: 30,
    max_attempts: 3,
};

/// External collaborators, injected at construction.
pub struct OrchestratorDeps {
    pub repository: Arc<dyn OrderRepository>,
    pub queue: Arc<dyn DelayedJobQueue>,
    pub orders: Arc<dyn OrderDirectory>,
    pub vendors: Arc<dyn VendorDirectory>,
    pub messenger: Arc<dyn Messenger>,
    pub tracking: Arc<dyn TrackingClient>,
    pub dispatch: Arc<dyn DispatchClient>,
    pub ivr: Arc<dyn IvrClient>,
    pub masked_numbers: Arc<dyn MaskedNumberService>,
    pub alerter: Arc<dyn SupportAlerter>,
    pub notifier: Arc<dyn VendorNotifier>,
}

pub struct PostPaymentOrchestrator {
    config: OrchestratorConfig,
    repository: Arc<dyn OrderRepository>,
    queue: Arc<dyn DelayedJobQueue>,
    orders: Arc<dyn OrderDirectory>,
    vendors: Arc<dyn VendorDirectory>,
    messenger: Arc<dyn Messenger>,
    tracking: Arc<dyn TrackingClient>,
    dispatch: Arc<dyn DispatchClient>,
    ivr: Arc<dyn IvrClient>,
    masked_numbers: Arc<dyn MaskedNumberService>,
    alerter: Arc<dyn SupportAlerter>,
    notifier: Arc<dyn VendorNotifier>,
    best_effort: BestEffort,
}

impl PostPaymentOrchestrator {
    pub fn new(config: OrchestratorConfig, deps: OrchestratorDeps) -> Self {
        let best_effort = BestEffort::new(config.best_effort_timeout);
        Self {
            config,
            repository: deps.repository,
            queue: deps.queue,
            orders: deps.orders,
            vendors: deps.vendors,
            messenger: deps.messenger,
            tracking: deps.tracking,
            dispatch: deps.dispatch,
            ivr: deps.ivr,
            masked_numbers: deps.masked_numbers,
            alerter: deps.alerter,
            notifier: deps.notifier,
            best_effort,
        }
    }

    /// Shared status-update operation used by every entry point.
    ///
    /// Reads the current status from the append-only history (not the racy
    /// materialized column), validates the transition, appends a history
    /// row, then compare-and-sets the column. A stale column write losing
    /// the CAS is expected under races and not an error. Returns `false`
    /// when the order is already in the target status (replay no-op).
    async fn update_status(
        &self,
        order_id: i64,
        new_status: OrderStatus,
        metadata: Value,
        source: &str,
    ) -> Result<bool> {
        let current = self
            .repository
            .current_status(order_id)
            .await?
            .unwrap_or_default();

        if current == new_status {
            debug!(order_id, status = %current, "already in target status, skipping");
            return Ok(false);
        }

        let next = ensure_transition(order_id, current, new_status)?;

        self.repository
            .append_history(OrderStatusHistory::new(
                order_id,
                next,
                Some(current),
                metadata,
                source,
            ))
            .await?;

        let applied = self
            .repository
            .compare_and_set_status(order_id, current, next)
            .await?;
        if !applied {
            debug!(
                order_id,
                from = %current,
                to = %next,
                "materialized status already moved on; history holds the truth"
            );
        }

        info!(order_id, from = %current, to = %next, source, "order status updated");
        Ok(true)
    }

    /// Load an order, falling back to the upstream order API when the local
    /// store has not seen it yet. The fetched order is persisted so later
    /// entry points find it locally.
    async fn load_order(&self, order_id: i64) -> Result<Order> {
        match self.repository.get_order(order_id).await {
            Ok(order) => Ok(order),
            Err(RepositoryError::NotFound { .. }) => {
                info!(order_id, "order not found locally, fetching from order API");
                let order = self.orders.fetch_order(order_id).await?;
                self.repository.insert_order(&order).await?;
                Ok(order)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Entry point for the payment-confirmed event.
    ///
    /// This is the one swallow-and-alert boundary: whatever breaks inside,
    /// the caller (a payment webhook) never sees a panic or an error, and
    /// the failure always produces a support alert. The order is left in
    /// whatever status was last successfully persisted.
    pub async fn on_payment_confirmed(&self, payment: PaymentConfirmation) {
        let order_id = payment.order_id;
        if let Err(err) = self.process_payment_confirmation(&payment).await {
            error!(order_id, error = %err, "payment confirmation workflow failed");
            let alert = SupportAlert::new(
                alert_topics::PAYMENT_FLOW_FAILURE,
                order_id,
                format!("post-payment workflow failed: {err}"),
                json!({ "payment_id": payment.payment_id }),
            )
            .manual_intervention();
            if let Err(alert_err) = self.alerter.alert(alert).await {
                error!(order_id, error = %alert_err, "failed to raise payment-flow alert");
            }
        }
    }

    async fn process_payment_confirmation(&self, payment: &PaymentConfirmation) -> Result<()> {
        let order_id = payment.order_id;
        let order = self.load_order(order_id).await?;

        let newly = self
            .update_status(
                order_id,
                OrderStatus::Confirmed,
                json!({
                    "payment_id": payment.payment_id,
                    "payment_method": payment.payment_method,
                    "amount": payment.amount,
                    "transaction_id": payment.transaction_id,
                }),
                sources::ORCHESTRATOR,
            )
            .await?;

        // On replay, skip the one-shot side effects (customer already
        // messaged, vendor already notified) but fall through to the timer
        // enqueues: a previous call may have persisted the status and then
        // failed before arming them, and the unique keys make re-scheduling
        // safe.
        if newly {
            self.message_customer(
                &order,
                &format!(
                    "Your order #{order_id} is confirmed! We're passing it to the restaurant now."
                ),
            )
            .await;

            if let Some(tracking_id) = self
                .best_effort
                .call("tracking_create_order", order_id, async {
                    self.tracking.create_order(&order).await
                })
                .await
            {
                self.repository.set_tracking_id(order_id, tracking_id).await?;
            }
        } else {
            debug!(order_id, "replayed payment confirmation, re-arming timers only");
        }

        let vendor = self.vendors.get_vendor(order.store_id).await?;

        // First vendor notification attempt happens inline; only the retry
        // path goes through the queue.
        if newly {
            let summary = order_summary(&order);
            let results =
                attempt_all_channels(self.notifier.as_ref(), &vendor, order_id, &summary).await;
            if results.iter().any(|r| r.success) {
                info!(order_id, "vendor notified of new order");
            } else {
                warn!(order_id, vendor_id = vendor.id, "all vendor channels failed, queueing retries");
                let payload = VendorNotificationPayload {
                    order_id,
                    vendor: vendor.clone(),
                    summary,
                    attempt: 1,
                    failed_channels: results,
                };
                self.queue
                    .enqueue(
                        job_types::RETRY_VENDOR_NOTIFICATION,
                        serde_json::to_value(&payload)?,
                        self.config.vendor_notification_backoff_base,
                        Some(job_keys::vendor_notification(order_id)),
                        RetryPolicy::Exponential {
                            base_secs: self.config.vendor_notification_backoff_base.as_secs(),
                            max_delay_secs: self.config.vendor_notification_backoff_max.as_secs(),
                            max_attempts: self.config.vendor_notification_max_attempts,
                        },
                    )
                    .await?;
            }
        }

        // Timers are keyed per (order, job type): a webhook replay cannot
        // duplicate them, and a replay after a partial failure re-arms any
        // timer the first pass never managed to enqueue.
        let timer_payload = json!({ "order_id": order_id, "vendor_id": vendor.id });
        self.queue
            .enqueue(
                job_types::VENDOR_REMINDER,
                timer_payload.clone(),
                self.config.vendor_reminder_delay,
                Some(job_keys::vendor_reminder(order_id)),
                TIMER_JOB_RETRY,
            )
            .await?;
        self.queue
            .enqueue(
                job_types::VENDOR_ESCALATION,
                timer_payload,
                self.config.vendor_escalation_delay,
                Some(job_keys::vendor_escalation(order_id)),
                TIMER_JOB_RETRY,
            )
            .await?;

        Ok(())
    }

    /// Entry point for the vendor's accept/reject.
    pub async fn on_vendor_response(&self, response: VendorResponse) -> Result<()> {
        if response.accepted {
            self.vendor_accepted(&response).await
        } else {
            self.vendor_rejected(&response).await
        }
    }

    async fn vendor_accepted(&self, response: &VendorResponse) -> Result<()> {
        let order_id = response.order_id;
        let order = self.load_order(order_id).await?;
        let prep_minutes = response
            .prep_time_minutes
            .unwrap_or(self.config.default_prep_time_minutes)
            .max(0);

        let newly = self
            .update_status(
                order_id,
                OrderStatus::Preparing,
                json!({ "prep_time_minutes": prep_minutes }),
                sources::ORCHESTRATOR,
            )
            .await?;

        // A replay skips the customer-facing side effects but still schedules
        // the search: if a prior call persisted `preparing` and then failed on
        // the enqueue, this is the retry that arms it. The unique key keeps
        // the happy path to a single job.
        if newly {
            self.mirror_tracking_status(
                &order,
                OrderStatus::Preparing,
                json!({ "prep_time_minutes": prep_minutes }),
            )
            .await;
            self.message_customer(
                &order,
                &format!(
                    "The restaurant confirmed your order #{order_id}. It should be ready in about {prep_minutes} minutes."
                ),
            )
            .await;
        } else {
            debug!(order_id, "replayed vendor acceptance, re-arming rider search only");
        }

        // Start the search shortly before the food is ready, never in the
        // past.
        let prep = Duration::from_secs(prep_minutes as u64 * 60);
        let delay = prep.saturating_sub(self.config.rider_search_lead_time);
        self.queue
            .enqueue(
                job_types::RIDER_SEARCH,
                json!({ "order_id": order_id, "attempt": 1 }),
                delay,
                Some(job_keys::rider_search(order_id)),
                TIMER_JOB_RETRY,
            )
            .await?;

        Ok(())
    }

    async fn vendor_rejected(&self, response: &VendorResponse) -> Result<()> {
        let order_id = response.order_id;
        let order = self.load_order(order_id).await?;
        let reason = response.rejection_reason.unwrap_or(RejectionReason::Other);

        let newly = self
            .update_status(
                order_id,
                OrderStatus::Cancelled,
                json!({ "rejection_reason": reason }),
                sources::ORCHESTRATOR,
            )
            .await?;

        if newly {
            self.mirror_tracking_status(
                &order,
                OrderStatus::Cancelled,
                json!({ "rejection_reason": reason }),
            )
            .await;

            let refund_note = if order.payment_method.is_cash() {
                ""
            } else {
                " Your payment will be refunded."
            };
            self.message_customer(
                &order,
                &format!(
                    "Sorry, your order #{order_id} was cancelled: {}.{refund_note}",
                    reason.customer_text()
                ),
            )
            .await;
        }

        // The refund record is idempotent on its own, not gated on `newly`:
        // a replay that crashed between cancel and refund must still land
        // the refund request.
        if !order.payment_method.is_cash()
            && self.repository.refund_requests(order_id).await?.is_empty()
        {
            self.repository
                .record_refund_request(&RefundRequest::new(
                    order_id,
                    order.amount,
                    order.payment_method,
                    format!("vendor rejected: {}", reason.as_str()),
                ))
                .await?;

            let alert = SupportAlert::new(
                alert_topics::REFUND_REQUESTED,
                order_id,
                format!(
                    "refund of {} owed for order #{order_id} (vendor rejected: {})",
                    order.amount,
                    reason.as_str()
                ),
                json!({ "amount": order.amount, "payment_method": order.payment_method }),
            );
            if let Err(err) = self.alerter.alert(alert).await {
                error!(order_id, error = %err, "failed to raise refund alert");
            }
        }

        Ok(())
    }

    async fn start_rider_search_inner(&self, order_id: i64, attempt: u32) -> Result<()> {
        let order = self.load_order(order_id).await?;
        let current = self
            .repository
            .current_status(order_id)
            .await?
            .unwrap_or_default();

        // A timer may fire long after the order moved on through another
        // path; re-check on every entry.
        if !matches!(
            current,
            OrderStatus::Preparing | OrderStatus::SearchingRider
        ) {
            info!(order_id, status = %current, "order not eligible for rider search, skipping");
            return Ok(());
        }

        if current != OrderStatus::SearchingRider {
            self.update_status(
                order_id,
                OrderStatus::SearchingRider,
                json!({ "attempt": attempt }),
                sources::ORCHESTRATOR,
            )
            .await?;
        }

        if attempt <= 1 {
            self.message_customer(
                &order,
                &format!("We're finding a delivery partner for your order #{order_id}."),
            )
            .await;
        }

        let found = match self
            .dispatch
            .find_available_rider(order.pickup, order.drop, order_id, order.amount)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(order_id, attempt, error = %err, "dispatch lookup failed");
                None
            }
        };

        match found {
            Some(rider) => self.assign_rider(order_id, rider).await,
            None => self.handle_rider_not_found(&order, attempt).await,
        }
    }

    async fn handle_rider_not_found(&self, order: &Order, attempt: u32) -> Result<()> {
        let order_id = order.id;
        if attempt >= self.config.rider_search_max_attempts {
            warn!(
                order_id,
                attempts = attempt,
                "rider search exhausted, handing off to manual handling"
            );
            self.message_customer(
                order,
                &format!(
                    "We couldn't find a delivery partner for your order #{order_id} yet. \
                     Reply 1 to pick it up yourself, 2 to keep waiting, or 3 to cancel."
                ),
            )
            .await;
            let alert = SupportAlert::new(
                alert_topics::NO_RIDER_FOUND,
                order_id,
                format!(
                    "no rider found for order #{order_id} after {attempt} attempts"
                ),
                json!({
                    "store_id": order.store_id,
                    "pickup_address": order.pickup_address,
                    "drop_address": order.drop_address,
                }),
            )
            .manual_intervention();
            self.alerter.alert(alert).await?;
            return Ok(());
        }

        let next_attempt = attempt + 1;
        self.queue
            .enqueue(
                job_types::RIDER_SEARCH_RETRY,
                json!({ "order_id": order_id, "attempt": next_attempt }),
                self.config.rider_search_retry_delay,
                Some(job_keys::rider_search_retry(order_id, next_attempt)),
                RetryPolicy::None,
            )
            .await?;
        info!(order_id, next_attempt, "rider search retry scheduled");
        Ok(())
    }

    /// Assign a rider found by dispatch (or by manual ops action).
    pub async fn assign_rider(&self, order_id: i64, rider: Rider) -> Result<()> {
        let order = self.load_order(order_id).await?;

        let newly = self
            .update_status(
                order_id,
                OrderStatus::RiderAssigned,
                json!({
                    "rider_id": rider.rider_id,
                    "rider_name": rider.name,
                    "vehicle_number": rider.vehicle_number,
                }),
                sources::ORCHESTRATOR,
            )
            .await?;
        if !newly {
            return Ok(());
        }

        self.repository.set_rider(order_id, &rider).await?;
        self.mirror_tracking_status(
            &order,
            OrderStatus::RiderAssigned,
            json!({ "rider_id": rider.rider_id, "rider_name": rider.name }),
        )
        .await;

        // Privacy number between customer and rider; fall back to the real
        // number when the capability is absent.
        let contact = self
            .best_effort
            .call("create_masked_number", order_id, async {
                self.masked_numbers
                    .create_masked_number(
                        &order.customer_phone,
                        &rider.phone,
                        self.config.masked_number_ttl,
                    )
                    .await
            })
            .await
            .flatten()
            .unwrap_or_else(|| rider.phone.clone());

        self.best_effort
            .call("ivr_assign_rider", order_id, async {
                self.ivr.assign_rider(&rider, order_id).await
            })
            .await;

        self.message_customer(
            &order,
            &format!(
                "{} is picking up your order #{order_id}. You can reach them at {contact}.",
                rider.name
            ),
        )
        .await;

        if let Some(vendor) = self
            .best_effort
            .call("vendor_lookup", order_id, async {
                self.vendors.get_vendor(order.store_id).await
            })
            .await
        {
            self.best_effort
                .call("vendor_message", order_id, async {
                    self.messenger
                        .send(
                            &vendor.phone,
                            &format!(
                                "{} ({contact}) will collect order #{order_id}.",
                                rider.name
                            ),
                        )
                        .await
                })
                .await;
        }

        Ok(())
    }

    /// Rider-side cancellation: fall back to searching without inventing a
    /// new status. Explicit event, never inferred from a timeout.
    pub async fn on_rider_cancelled(&self, order_id: i64) -> Result<()> {
        let current = self
            .repository
            .current_status(order_id)
            .await?
            .unwrap_or_default();
        if !matches!(
            current,
            OrderStatus::RiderAssigned | OrderStatus::OnWayToPickup
        ) {
            info!(order_id, status = %current, "rider cancellation ignored in this status");
            return Ok(());
        }

        self.update_status(
            order_id,
            OrderStatus::SearchingRider,
            json!({ "reason": "rider_cancelled" }),
            sources::ORCHESTRATOR,
        )
        .await?;
        self.start_rider_search_inner(order_id, 1).await
    }

    /// High-frequency telemetry entry point. Forwards the raw ping to
    /// tracking unconditionally, then derives at most one geofence
    /// transition; a no-op whenever the order is not in an eligible status.
    pub async fn on_rider_location_update(
        &self,
        order_id: i64,
        location: GeoPoint,
    ) -> Result<()> {
        let order = self.load_order(order_id).await?;

        if let Some(tracking_id) = order.tracking_id {
            self.best_effort
                .call("tracking_update_location", order_id, async {
                    self.tracking
                        .update_location(tracking_id, location.lat, location.lng)
                        .await
                })
                .await;
        }

        let current = self
            .repository
            .current_status(order_id)
            .await?
            .unwrap_or_default();

        match current {
            OrderStatus::RiderAssigned | OrderStatus::OnWayToPickup => {
                let distance = haversine_distance_m(location, order.pickup);
                if distance < self.config.geofence_radius_m {
                    let newly = self
                        .update_status(
                            order_id,
                            OrderStatus::ReachedPickup,
                            json!({ "distance_m": distance }),
                            sources::ORCHESTRATOR,
                        )
                        .await?;
                    if newly {
                        if let Some(vendor) = self
                            .best_effort
                            .call("vendor_lookup", order_id, async {
                                self.vendors.get_vendor(order.store_id).await
                            })
                            .await
                        {
                            self.best_effort
                                .call("vendor_message", order_id, async {
                                    self.messenger
                                        .send(
                                            &vendor.phone,
                                            &format!(
                                                "The rider has arrived for order #{order_id}."
                                            ),
                                        )
                                        .await
                                })
                                .await;
                        }
                    }
                }
            }
            OrderStatus::OutForDelivery => {
                let distance = haversine_distance_m(location, order.drop);
                if distance < self.config.geofence_radius_m {
                    let newly = self
                        .update_status(
                            order_id,
                            OrderStatus::ReachedDelivery,
                            json!({ "distance_m": distance }),
                            sources::ORCHESTRATOR,
                        )
                        .await?;
                    if newly {
                        self.message_customer(
                            &order,
                            &format!("Your order #{order_id} is arriving, please be ready!"),
                        )
                        .await;
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Explicit pickup milestone from the rider app.
    pub async fn handle_order_picked_up(&self, order_id: i64) -> Result<()> {
        let order = self.load_order(order_id).await?;
        let newly = self
            .update_status(
                order_id,
                OrderStatus::OutForDelivery,
                json!({}),
                sources::ORCHESTRATOR,
            )
            .await?;
        if newly {
            self.mirror_tracking_status(&order, OrderStatus::OutForDelivery, json!({}))
                .await;
            self.message_customer(
                &order,
                &format!("Your order #{order_id} is on its way!"),
            )
            .await;
        }
        Ok(())
    }

    /// Explicit delivery milestone from the rider app.
    pub async fn handle_order_delivered(&self, order_id: i64) -> Result<()> {
        let order = self.load_order(order_id).await?;
        let newly = self
            .update_status(
                order_id,
                OrderStatus::Delivered,
                json!({}),
                sources::ORCHESTRATOR,
            )
            .await?;
        if newly {
            self.mirror_tracking_status(&order, OrderStatus::Delivered, json!({}))
                .await;
            self.message_customer(
                &order,
                &format!("Your order #{order_id} has been delivered. Enjoy your meal!"),
            )
            .await;
            self.message_customer(
                &order,
                "How was your experience? Reply with a rating from 1 to 5.",
            )
            .await;
        }
        Ok(())
    }

    async fn message_customer(&self, order: &Order, text: &str) {
        self.best_effort
            .call("customer_message", order.id, async {
                self.messenger.send(&order.customer_phone, text).await
            })
            .await;
    }

    async fn mirror_tracking_status(&self, order: &Order, status: OrderStatus, fields: Value) {
        if let Some(tracking_id) = order.tracking_id {
            self.best_effort
                .call("tracking_update_status", order.id, async {
                    self.tracking.update_status(tracking_id, status, fields).await
                })
                .await;
        }
    }
}

fn order_summary(order: &Order) -> String {
    format!(
        "New order #{}: {:.2} ({}), deliver to {}",
        order.id,
        order.amount,
        order.payment_method,
        order.drop_address
    )
}

#[async_trait]
impl OrderWorkflow for PostPaymentOrchestrator {
    async fn remind_vendor(&self, order_id: i64) -> Result<()> {
        let order = self.load_order(order_id).await?;
        let vendor = self.vendors.get_vendor(order.store_id).await?;
        // Not best-effort: a failed reminder call should bubble up so the
        // queue retries it.
        self.ivr.confirm_vendor_order(&vendor, order_id).await?;
        info!(order_id, vendor_id = vendor.id, "vendor reminder call placed");
        Ok(())
    }

    async fn escalate_vendor_silence(&self, order_id: i64) -> Result<()> {
        let order = self.load_order(order_id).await?;
        self.update_status(
            order_id,
            OrderStatus::VendorNoResponse,
            json!({ "escalated": true }),
            sources::TIMEOUT_PROCESSOR,
        )
        .await?;

        let alert = SupportAlert::new(
            alert_topics::VENDOR_NO_RESPONSE,
            order_id,
            format!("vendor silent on order #{order_id} past the escalation window"),
            json!({ "store_id": order.store_id }),
        )
        .manual_intervention();
        self.alerter.alert(alert).await?;

        self.message_customer(
            &order,
            &format!(
                "We're still waiting on the restaurant for your order #{order_id}. \
                 Our team is looking into it."
            ),
        )
        .await;
        Ok(())
    }

    async fn start_rider_search(&self, order_id: i64, attempt: u32) -> Result<()> {
        self.start_rider_search_inner(order_id, attempt.max(1)).await
    }
}
