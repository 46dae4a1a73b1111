//! Shared test harness: in-memory backends plus recording fakes for every
//! external collaborator, wired into a fully functional orchestrator and
//! queue worker. Time only moves when a test advances the queue clock.

#![allow(dead_code)]

use async_trait::async_trait;
use orderflow_core::config::OrchestratorConfig;
use orderflow_core::models::{
    GeoPoint, Order, PaymentConfirmation, PaymentMethod, RejectionReason, Rider, Vendor,
    VendorResponse,
};
use orderflow_core::orchestration::{
    OrchestratorDeps, OrderTimeoutProcessor, PostPaymentOrchestrator, VendorNotificationProcessor,
};
use orderflow_core::queue::{
    DelayedJobQueue, JobEnvelope, JobOutcome, JobWorker, MemoryJobQueue, QueueError, QueueResult,
    RetryPolicy,
};
use orderflow_core::repository::{MemoryOrderRepository, OrderRepository};
use orderflow_core::services::{
    ChannelResult, DispatchClient, IvrClient, MaskedNumberService, Messenger, NotificationChannel,
    OrderDirectory, ServiceError, ServiceResult, SupportAlert, SupportAlerter, TrackingClient,
    VendorDirectory, VendorNotifier,
};
use orderflow_core::state_machine::OrderStatus;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const MASKED_NUMBER: &str = "+918000000001";

// Bangalore coordinates, roughly 5km apart.
pub const PICKUP: GeoPoint = GeoPoint {
    lat: 12.9716,
    lng: 77.5946,
};
pub const DROP: GeoPoint = GeoPoint {
    lat: 12.9352,
    lng: 77.6245,
};

/// A point roughly 11m north of `p`: inside the 50m geofence.
pub fn near(p: GeoPoint) -> GeoPoint {
    GeoPoint::new(p.lat + 0.0001, p.lng)
}

/// A point roughly 1.1km north of `p`: well outside the geofence.
pub fn far(p: GeoPoint) -> GeoPoint {
    GeoPoint::new(p.lat + 0.01, p.lng)
}

pub fn sample_order(id: i64, payment_method: PaymentMethod) -> Order {
    Order {
        id,
        status: OrderStatus::Pending,
        store_id: 42,
        customer_name: "Asha".into(),
        customer_phone: "+911234567890".into(),
        pickup: PICKUP,
        pickup_address: "12 MG Road".into(),
        drop: DROP,
        drop_address: "7 Koramangala 5th Block".into(),
        payment_method,
        amount: 450.0,
        rider: None,
        tracking_id: None,
    }
}

pub fn sample_vendor() -> Vendor {
    Vendor {
        id: 42,
        name: "Hotel Dwaraka".into(),
        phone: "+918765432100".into(),
        email: Some("orders@dwaraka.example".into()),
        language: Some("kn".into()),
        address: Some("12 MG Road".into()),
    }
}

pub fn sample_rider() -> Rider {
    Rider {
        rider_id: 7,
        name: "Ravi".into(),
        phone: "+917000000007".into(),
        vehicle_number: Some("KA01AB1234".into()),
    }
}

pub fn payment_for(order: &Order) -> PaymentConfirmation {
    PaymentConfirmation {
        order_id: order.id,
        payment_id: format!("pay_{}", order.id),
        payment_method: order.payment_method,
        amount: order.amount,
        transaction_id: Some(format!("txn_{}", order.id)),
    }
}

pub fn acceptance(order_id: i64, prep_time_minutes: i64) -> VendorResponse {
    VendorResponse {
        order_id,
        accepted: true,
        prep_time_minutes: Some(prep_time_minutes),
        rejection_reason: None,
    }
}

pub fn rejection(order_id: i64, reason: RejectionReason) -> VendorResponse {
    VendorResponse {
        order_id,
        accepted: false,
        prep_time_minutes: None,
        rejection_reason: Some(reason),
    }
}

#[derive(Default)]
pub struct FakeVendorDirectory {
    pub fail_lookup: AtomicBool,
}

#[async_trait]
impl VendorDirectory for FakeVendorDirectory {
    async fn get_vendor(&self, _store_id: i64) -> ServiceResult<Vendor> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("vendor-directory", "backend down"));
        }
        Ok(sample_vendor())
    }
}

/// Upstream order API. Empty unless the test seeds it.
#[derive(Default)]
pub struct FakeOrderDirectory {
    pub known: Mutex<Vec<Order>>,
}

impl FakeOrderDirectory {
    pub fn put(&self, order: Order) {
        self.known.lock().push(order);
    }
}

#[async_trait]
impl OrderDirectory for FakeOrderDirectory {
    async fn fetch_order(&self, order_id: i64) -> ServiceResult<Order> {
        self.known
            .lock()
            .iter()
            .find(|o| o.id == order_id)
            .cloned()
            .ok_or_else(|| ServiceError::rejected("order-api", format!("no order {order_id}")))
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl FakeMessenger {
    pub fn messages_to(&self, phone: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(p, _)| p == phone)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send(&self, phone: &str, text: &str) -> ServiceResult<()> {
        self.sent.lock().push((phone.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTracking {
    pub created: Mutex<Vec<(Uuid, i64)>>,
    pub status_updates: Mutex<Vec<(Uuid, OrderStatus)>>,
    pub location_updates: Mutex<Vec<(Uuid, f64, f64)>>,
}

#[async_trait]
impl TrackingClient for FakeTracking {
    async fn create_order(&self, order: &Order) -> ServiceResult<Uuid> {
        let id = Uuid::new_v4();
        self.created.lock().push((id, order.id));
        Ok(id)
    }

    async fn update_status(
        &self,
        correlation_id: Uuid,
        status: OrderStatus,
        _fields: Value,
    ) -> ServiceResult<()> {
        self.status_updates.lock().push((correlation_id, status));
        Ok(())
    }

    async fn update_location(
        &self,
        correlation_id: Uuid,
        lat: f64,
        lng: f64,
    ) -> ServiceResult<()> {
        self.location_updates.lock().push((correlation_id, lat, lng));
        Ok(())
    }
}

/// Scripted dispatch: pops one response per lookup; an empty script means
/// "search ran, nobody available".
#[derive(Default)]
pub struct FakeDispatch {
    pub script: Mutex<VecDeque<Option<Rider>>>,
    pub lookups: Mutex<Vec<i64>>,
}

impl FakeDispatch {
    pub fn push_response(&self, rider: Option<Rider>) {
        self.script.lock().push_back(rider);
    }
}

#[async_trait]
impl DispatchClient for FakeDispatch {
    async fn find_available_rider(
        &self,
        _pickup: GeoPoint,
        _drop: GeoPoint,
        order_id: i64,
        _amount: f64,
    ) -> ServiceResult<Option<Rider>> {
        self.lookups.lock().push(order_id);
        Ok(self.script.lock().pop_front().flatten())
    }
}

#[derive(Default)]
pub struct FakeIvr {
    pub vendor_calls: Mutex<Vec<i64>>,
    pub rider_calls: Mutex<Vec<i64>>,
    pub fail_vendor_calls: AtomicBool,
}

#[async_trait]
impl IvrClient for FakeIvr {
    async fn confirm_vendor_order(&self, _vendor: &Vendor, order_id: i64) -> ServiceResult<()> {
        if self.fail_vendor_calls.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("ivr", "trunk busy"));
        }
        self.vendor_calls.lock().push(order_id);
        Ok(())
    }

    async fn assign_rider(&self, _rider: &Rider, order_id: i64) -> ServiceResult<()> {
        self.rider_calls.lock().push(order_id);
        Ok(())
    }
}

pub struct FakeMaskedNumbers {
    pub available: AtomicBool,
}

impl Default for FakeMaskedNumbers {
    fn default() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl MaskedNumberService for FakeMaskedNumbers {
    async fn create_masked_number(
        &self,
        _party_a: &str,
        _party_b: &str,
        _ttl: Duration,
    ) -> ServiceResult<Option<String>> {
        if self.available.load(Ordering::SeqCst) {
            Ok(Some(MASKED_NUMBER.to_string()))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
pub struct FakeAlerter {
    pub alerts: Mutex<Vec<SupportAlert>>,
}

impl FakeAlerter {
    pub fn with_topic(&self, topic: &str) -> Vec<SupportAlert> {
        self.alerts
            .lock()
            .iter()
            .filter(|a| a.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SupportAlerter for FakeAlerter {
    async fn alert(&self, alert: SupportAlert) -> ServiceResult<()> {
        self.alerts.lock().push(alert);
        Ok(())
    }
}

/// Vendor notifier with per-channel scripted failures.
#[derive(Default)]
pub struct FakeNotifier {
    pub failing: Mutex<Vec<NotificationChannel>>,
    pub sent: Mutex<Vec<ChannelResult>>,
}

impl FakeNotifier {
    pub fn fail_channels(&self, channels: &[NotificationChannel]) {
        *self.failing.lock() = channels.to_vec();
    }

    pub fn fail_all(&self) {
        self.fail_channels(&NotificationChannel::ALL);
    }
}

#[async_trait]
impl VendorNotifier for FakeNotifier {
    async fn send(
        &self,
        channel: NotificationChannel,
        _vendor: &Vendor,
        _order_id: i64,
        _summary: &str,
    ) -> ServiceResult<()> {
        if self.failing.lock().contains(&channel) {
            self.sent.lock().push(ChannelResult {
                channel,
                success: false,
                error: Some("scripted failure".into()),
            });
            Err(ServiceError::unavailable(channel.as_str(), "scripted failure"))
        } else {
            self.sent.lock().push(ChannelResult {
                channel,
                success: true,
                error: None,
            });
            Ok(())
        }
    }
}

/// Queue wrapper that fails the next enqueue of each scripted job type with
/// a transient storage error, then passes everything through. Models the
/// "status persisted, timer enqueue lost" crash window.
pub struct FlakyQueue {
    inner: Arc<MemoryJobQueue>,
    fail_next: Mutex<Vec<String>>,
}

impl FlakyQueue {
    pub fn new(inner: Arc<MemoryJobQueue>) -> Self {
        Self {
            inner,
            fail_next: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_enqueue(&self, job_type: &str) {
        self.fail_next.lock().push(job_type.to_string());
    }
}

#[async_trait]
impl DelayedJobQueue for FlakyQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        delay: Duration,
        unique_key: Option<String>,
        retry: RetryPolicy,
    ) -> QueueResult<i64> {
        {
            let mut failing = self.fail_next.lock();
            if let Some(pos) = failing.iter().position(|t| t == job_type) {
                failing.remove(pos);
                return Err(QueueError::database(format!("scripted outage for {job_type}")));
            }
        }
        self.inner
            .enqueue(job_type, payload, delay, unique_key, retry)
            .await
    }

    async fn due_jobs(&self, limit: i64) -> QueueResult<Vec<JobEnvelope>> {
        self.inner.due_jobs(limit).await
    }

    async fn complete(&self, job_id: i64) -> QueueResult<()> {
        self.inner.complete(job_id).await
    }

    async fn fail(&self, job_id: i64, error: &str) -> QueueResult<JobOutcome> {
        self.inner.fail(job_id, error).await
    }
}

pub struct Harness {
    pub repo: Arc<MemoryOrderRepository>,
    pub queue: Arc<MemoryJobQueue>,
    pub flaky: Arc<FlakyQueue>,
    pub order_api: Arc<FakeOrderDirectory>,
    pub vendors: Arc<FakeVendorDirectory>,
    pub messenger: Arc<FakeMessenger>,
    pub tracking: Arc<FakeTracking>,
    pub dispatch: Arc<FakeDispatch>,
    pub ivr: Arc<FakeIvr>,
    pub masked: Arc<FakeMaskedNumbers>,
    pub alerter: Arc<FakeAlerter>,
    pub notifier: Arc<FakeNotifier>,
    pub orchestrator: Arc<PostPaymentOrchestrator>,
    pub worker: JobWorker,
}

impl Harness {
    pub fn new() -> Self {
        let config = OrchestratorConfig::default();
        let repo = Arc::new(MemoryOrderRepository::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let flaky = Arc::new(FlakyQueue::new(queue.clone()));
        let order_api = Arc::new(FakeOrderDirectory::default());
        let vendors = Arc::new(FakeVendorDirectory::default());
        let messenger = Arc::new(FakeMessenger::default());
        let tracking = Arc::new(FakeTracking::default());
        let dispatch = Arc::new(FakeDispatch::default());
        let ivr = Arc::new(FakeIvr::default());
        let masked = Arc::new(FakeMaskedNumbers::default());
        let alerter = Arc::new(FakeAlerter::default());
        let notifier = Arc::new(FakeNotifier::default());

        let orchestrator = Arc::new(PostPaymentOrchestrator::new(
            config.clone(),
            OrchestratorDeps {
                repository: repo.clone(),
                queue: flaky.clone(),
                orders: order_api.clone(),
                vendors: vendors.clone(),
                messenger: messenger.clone(),
                tracking: tracking.clone(),
                dispatch: dispatch.clone(),
                ivr: ivr.clone(),
                masked_numbers: masked.clone(),
                alerter: alerter.clone(),
                notifier: notifier.clone(),
            },
        ));

        let mut worker = JobWorker::new(
            flaky.clone(),
            config.worker_poll_interval,
            config.worker_batch_size,
        );
        worker.register(Arc::new(OrderTimeoutProcessor::new(
            repo.clone(),
            orchestrator.clone(),
        )));
        worker.register(Arc::new(VendorNotificationProcessor::new(
            notifier.clone(),
            alerter.clone(),
        )));

        Self {
            repo,
            queue,
            flaky,
            order_api,
            vendors,
            messenger,
            tracking,
            dispatch,
            ivr,
            masked,
            alerter,
            notifier,
            orchestrator,
            worker,
        }
    }

    pub async fn insert_order(&self, order: &Order) {
        self.repo.insert_order(order).await.unwrap();
    }

    pub async fn status_of(&self, order_id: i64) -> OrderStatus {
        self.repo
            .current_status(order_id)
            .await
            .unwrap()
            .unwrap_or_default()
    }

    pub async fn history_statuses(&self, order_id: i64) -> Vec<OrderStatus> {
        self.repo
            .history(order_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.new_status)
            .collect()
    }

    /// Advance the queue clock, then drain one worker poll.
    pub async fn advance_and_drain(&self, by: Duration) -> usize {
        self.queue.advance(by);
        self.worker.run_once().await.unwrap()
    }

    pub fn customer_messages(&self, order: &Order) -> Vec<String> {
        self.messenger.messages_to(&order.customer_phone)
    }

    pub fn vendor_messages(&self) -> Vec<String> {
        self.messenger.messages_to(&sample_vendor().phone)
    }
}
