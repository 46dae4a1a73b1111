//! sqlx/Postgres implementation of [`OrderRepository`].
//!
//! Queries are runtime-bound (`sqlx::query(...).bind(...)`); the history
//! table uses the sort_key/most_recent pattern so "current status" is a
//! single indexed read and ordering survives concurrent writers.

use super::{OrderRepository, RepositoryError, RepositoryResult};
use crate::models::{GeoPoint, Order, OrderStatusHistory, PaymentMethod, RefundRequest, Rider};
use crate::state_machine::OrderStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing tables if they do not exist.
    pub async fn migrate(&self) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orderflow_orders (
                id BIGINT PRIMARY KEY,
                status TEXT NOT NULL,
                store_id BIGINT NOT NULL,
                customer_name TEXT NOT NULL,
                customer_phone TEXT NOT NULL,
                pickup_lat DOUBLE PRECISION NOT NULL,
                pickup_lng DOUBLE PRECISION NOT NULL,
                pickup_address TEXT NOT NULL,
                drop_lat DOUBLE PRECISION NOT NULL,
                drop_lng DOUBLE PRECISION NOT NULL,
                drop_address TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                amount DOUBLE PRECISION NOT NULL,
                rider JSONB,
                tracking_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orderflow_order_status_history (
                id BIGSERIAL PRIMARY KEY,
                order_id BIGINT NOT NULL,
                new_status TEXT NOT NULL,
                previous_status TEXT,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                source TEXT NOT NULL,
                sort_key INT NOT NULL,
                most_recent BOOLEAN NOT NULL DEFAULT true,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_order_history_current
            ON orderflow_order_status_history (order_id, sort_key DESC)
            WHERE most_recent
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orderflow_refund_requests (
                id BIGSERIAL PRIMARY KEY,
                order_id BIGINT NOT NULL,
                amount DOUBLE PRECISION NOT NULL,
                payment_method TEXT NOT NULL,
                reason TEXT NOT NULL,
                requested_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn parse_status(order_id: i64, raw: &str) -> RepositoryResult<OrderStatus> {
        OrderStatus::normalize(raw)
            .ok_or_else(|| RepositoryError::corrupt_state(order_id, format!("bad status {raw:?}")))
    }
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> RepositoryResult<Order> {
    let order_id: i64 = row.try_get("id")?;
    let status_raw: String = row.try_get("status")?;
    let payment_raw: String = row.try_get("payment_method")?;
    let rider: Option<serde_json::Value> = row.try_get("rider")?;

    Ok(Order {
        id: order_id,
        status: PgOrderRepository::parse_status(order_id, &status_raw)?,
        store_id: row.try_get("store_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        pickup: GeoPoint::new(row.try_get("pickup_lat")?, row.try_get("pickup_lng")?),
        pickup_address: row.try_get("pickup_address")?,
        drop: GeoPoint::new(row.try_get("drop_lat")?, row.try_get("drop_lng")?),
        drop_address: row.try_get("drop_address")?,
        payment_method: serde_json::from_value(serde_json::Value::String(payment_raw))?,
        amount: row.try_get("amount")?,
        rider: rider.map(serde_json::from_value).transpose()?,
        tracking_id: row.try_get("tracking_id")?,
    })
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_order(&self, order: &Order) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orderflow_orders
                (id, status, store_id, customer_name, customer_phone,
                 pickup_lat, pickup_lng, pickup_address,
                 drop_lat, drop_lng, drop_address,
                 payment_method, amount, rider, tracking_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.store_id)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(order.pickup.lat)
        .bind(order.pickup.lng)
        .bind(&order.pickup_address)
        .bind(order.drop.lat)
        .bind(order.drop.lng)
        .bind(&order.drop_address)
        .bind(order.payment_method.as_str())
        .bind(order.amount)
        .bind(order.rider.as_ref().map(serde_json::to_value).transpose()?)
        .bind(order.tracking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: i64) -> RepositoryResult<Order> {
        let row = sqlx::query("SELECT * FROM orderflow_orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound { order_id })?;
        order_from_row(&row)
    }

    async fn current_status(&self, order_id: i64) -> RepositoryResult<Option<OrderStatus>> {
        let row = sqlx::query(
            r#"
            SELECT new_status
            FROM orderflow_order_status_history
            WHERE order_id = $1 AND most_recent
            ORDER BY sort_key DESC
            LIMIT 1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("new_status")?;
                Self::parse_status(order_id, &raw).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn history(&self, order_id: i64) -> RepositoryResult<Vec<OrderStatusHistory>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, new_status, previous_status, metadata, source, recorded_at
            FROM orderflow_order_status_history
            WHERE order_id = $1
            ORDER BY sort_key ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let new_raw: String = row.try_get("new_status")?;
                let prev_raw: Option<String> = row.try_get("previous_status")?;
                Ok(OrderStatusHistory {
                    order_id: row.try_get("order_id")?,
                    new_status: Self::parse_status(order_id, &new_raw)?,
                    previous_status: prev_raw
                        .map(|raw| Self::parse_status(order_id, &raw))
                        .transpose()?,
                    metadata: row.try_get("metadata")?,
                    source: row.try_get("source")?,
                    recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at")?,
                })
            })
            .collect()
    }

    async fn append_history(&self, entry: OrderStatusHistory) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT COALESCE(MAX(sort_key), 0) + 1 AS next_key
            FROM orderflow_order_status_history
            WHERE order_id = $1
            "#,
        )
        .bind(entry.order_id)
        .fetch_one(&mut *tx)
        .await?;
        let sort_key: i32 = row.try_get("next_key")?;

        sqlx::query(
            r#"
            INSERT INTO orderflow_order_status_history
                (order_id, new_status, previous_status, metadata, source, sort_key,
                 most_recent, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, true, $7)
            "#,
        )
        .bind(entry.order_id)
        .bind(entry.new_status.as_str())
        .bind(entry.previous_status.map(|s| s.as_str()))
        .bind(&entry.metadata)
        .bind(&entry.source)
        .bind(sort_key)
        .bind(entry.recorded_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE orderflow_order_status_history
            SET most_recent = false
            WHERE order_id = $1 AND sort_key < $2
            "#,
        )
        .bind(entry.order_id)
        .bind(sort_key)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn compare_and_set_status(
        &self,
        order_id: i64,
        expected: OrderStatus,
        new_status: OrderStatus,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orderflow_orders
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = $3
            "#,
        )
        .bind(order_id)
        .bind(new_status.as_str())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_rider(&self, order_id: i64, rider: &Rider) -> RepositoryResult<()> {
        sqlx::query("UPDATE orderflow_orders SET rider = $2, updated_at = now() WHERE id = $1")
            .bind(order_id)
            .bind(serde_json::to_value(rider)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_tracking_id(&self, order_id: i64, tracking_id: Uuid) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE orderflow_orders SET tracking_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(order_id)
        .bind(tracking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_refund_request(&self, request: &RefundRequest) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orderflow_refund_requests
                (order_id, amount, payment_method, reason, requested_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(request.order_id)
        .bind(request.amount)
        .bind(request.payment_method.as_str())
        .bind(&request.reason)
        .bind(request.requested_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn refund_requests(&self, order_id: i64) -> RepositoryResult<Vec<RefundRequest>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, amount, payment_method, reason, requested_at
            FROM orderflow_refund_requests
            WHERE order_id = $1
            ORDER BY requested_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let method_raw: String = row.try_get("payment_method")?;
                Ok(RefundRequest {
                    order_id: row.try_get("order_id")?,
                    amount: row.try_get("amount")?,
                    payment_method: serde_json::from_value::<PaymentMethod>(
                        serde_json::Value::String(method_raw),
                    )?,
                    reason: row.try_get("reason")?,
                    requested_at: row.try_get("requested_at")?,
                })
            })
            .collect()
    }
}
