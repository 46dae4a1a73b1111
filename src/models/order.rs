use crate::state_machine::OrderStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Online,
    Wallet,
}

impl PaymentMethod {
    /// Cash orders never produce refund requests; there is nothing to refund.
    pub fn is_cash(&self) -> bool {
        matches!(self, Self::Cash)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Online => "online",
            Self::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rider identity as returned by the dispatch lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rider {
    pub rider_id: i64,
    pub name: String,
    pub phone: String,
    pub vehicle_number: Option<String>,
}

/// Vendor contact details from the vendor directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub language: Option<String>,
    pub address: Option<String>,
}

/// The order aggregate. Mutated only through the orchestrator's status-update
/// operation; the `status` column is a materialized view of the append-only
/// history, not the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub status: OrderStatus,
    pub store_id: i64,
    pub customer_name: String,
    pub customer_phone: String,
    pub pickup: GeoPoint,
    pub pickup_address: String,
    pub drop: GeoPoint,
    pub drop_address: String,
    pub payment_method: PaymentMethod,
    pub amount: f64,
    pub rider: Option<Rider>,
    /// Correlation id in the external tracking system, set after the
    /// best-effort `create_order` call succeeds.
    pub tracking_id: Option<Uuid>,
}

/// Payment confirmation event, the workflow's entry signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: i64,
    pub payment_id: String,
    pub payment_method: PaymentMethod,
    pub amount: f64,
    pub transaction_id: Option<String>,
}

/// Structured reasons a vendor can reject an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    ItemUnavailable,
    TooBusy,
    ShopClosed,
    Other,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItemUnavailable => "item_unavailable",
            Self::TooBusy => "too_busy",
            Self::ShopClosed => "shop_closed",
            Self::Other => "other",
        }
    }

    /// Plain-language text for customer messages. Raw internal error text
    /// never reaches customers.
    pub fn customer_text(&self) -> &'static str {
        match self {
            Self::ItemUnavailable => "an item in your order is unavailable",
            Self::TooBusy => "the restaurant is too busy right now",
            Self::ShopClosed => "the restaurant is closed",
            Self::Other => "the restaurant could not take your order",
        }
    }
}

/// Vendor accept/reject event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorResponse {
    pub order_id: i64,
    pub accepted: bool,
    /// Minutes until the food is ready; only meaningful on acceptance.
    pub prep_time_minutes: Option<i64>,
    pub rejection_reason: Option<RejectionReason>,
}
