//! In-memory [`OrderRepository`] for tests and local development. Same
//! semantics as the Postgres backend, including the compare-and-set guard.

use super::{OrderRepository, RepositoryError, RepositoryResult};
use crate::models::{Order, OrderStatusHistory, RefundRequest, Rider};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryOrderRepository {
    orders: Mutex<HashMap<i64, Order>>,
    history: Mutex<Vec<OrderStatusHistory>>,
    refunds: Mutex<Vec<RefundRequest>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn insert_order(&self, order: &Order) -> RepositoryResult<()> {
        self.orders
            .lock()
            .entry(order.id)
            .or_insert_with(|| order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: i64) -> RepositoryResult<Order> {
        self.orders
            .lock()
            .get(&order_id)
            .cloned()
            .ok_or(RepositoryError::NotFound { order_id })
    }

    async fn current_status(&self, order_id: i64) -> RepositoryResult<Option<OrderStatus>> {
        Ok(self
            .history
            .lock()
            .iter()
            .rev()
            .find(|entry| entry.order_id == order_id)
            .map(|entry| entry.new_status))
    }

    async fn history(&self, order_id: i64) -> RepositoryResult<Vec<OrderStatusHistory>> {
        Ok(self
            .history
            .lock()
            .iter()
            .filter(|entry| entry.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn append_history(&self, entry: OrderStatusHistory) -> RepositoryResult<()> {
        self.history.lock().push(entry);
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        order_id: i64,
        expected: OrderStatus,
        new_status: OrderStatus,
    ) -> RepositoryResult<bool> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(&order_id)
            .ok_or(RepositoryError::NotFound { order_id })?;
        if order.status == expected {
            order.status = new_status;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn set_rider(&self, order_id: i64, rider: &Rider) -> RepositoryResult<()> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(&order_id)
            .ok_or(RepositoryError::NotFound { order_id })?;
        order.rider = Some(rider.clone());
        Ok(())
    }

    async fn set_tracking_id(&self, order_id: i64, tracking_id: Uuid) -> RepositoryResult<()> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(&order_id)
            .ok_or(RepositoryError::NotFound { order_id })?;
        order.tracking_id = Some(tracking_id);
        Ok(())
    }

    async fn record_refund_request(&self, request: &RefundRequest) -> RepositoryResult<()> {
        self.refunds.lock().push(request.clone());
        Ok(())
    }

    async fn refund_requests(&self, order_id: i64) -> RepositoryResult<Vec<RefundRequest>> {
        Ok(self
            .refunds
            .lock()
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }
}
