use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical order lifecycle states.
///
/// External systems speak several status vocabularies; everything is mapped
/// onto this set via [`OrderStatus::normalize`] before any comparison or
/// transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created, payment not yet confirmed
    Pending,
    /// Payment confirmed, waiting on the vendor
    Confirmed,
    /// Vendor accepted and is preparing the order
    Preparing,
    /// Vendor never responded within the escalation window
    VendorNoResponse,
    /// Looking for an available rider
    SearchingRider,
    /// Rider accepted the assignment
    RiderAssigned,
    /// Rider en route to the pickup point
    OnWayToPickup,
    /// Rider inside the pickup geofence
    ReachedPickup,
    /// Rider collected the order
    PickedUp,
    /// Rider en route to the customer
    OutForDelivery,
    /// Rider inside the delivery geofence
    ReachedDelivery,
    /// Order handed over to the customer
    Delivered,
    /// Order cancelled (vendor rejection, customer action, ops)
    Cancelled,
    /// Refund request resolved
    Refunded,
    /// Unrecoverable workflow failure
    Failed,
}

impl OrderStatus {
    /// Resolve a raw status string to its canonical value, accepting both
    /// canonical names and known external aliases. Returns `None` for
    /// anything unrecognized.
    pub fn normalize(raw: &str) -> Option<Self> {
        if let Ok(status) = raw.parse() {
            return Some(status);
        }
        match raw {
            "processing" => Some(Self::Preparing),
            "pickup_done" => Some(Self::PickedUp),
            "canceled" => Some(Self::Cancelled),
            "handover" => Some(Self::ReachedPickup),
            "accepted" => Some(Self::Confirmed),
            "created" => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::VendorNoResponse => "vendor_no_response",
            Self::SearchingRider => "searching_rider",
            Self::RiderAssigned => "rider_assigned",
            Self::OnWayToPickup => "on_way_to_pickup",
            Self::ReachedPickup => "reached_pickup",
            Self::PickedUp => "picked_up",
            Self::OutForDelivery => "out_for_delivery",
            Self::ReachedDelivery => "reached_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "vendor_no_response" => Ok(Self::VendorNoResponse),
            "searching_rider" => Ok(Self::SearchingRider),
            "rider_assigned" => Ok(Self::RiderAssigned),
            "on_way_to_pickup" => Ok(Self::OnWayToPickup),
            "reached_pickup" => Ok(Self::ReachedPickup),
            "picked_up" => Ok(Self::PickedUp),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "reached_delivery" => Ok(Self::ReachedDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

/// Every canonical status, in lifecycle order. Used by the transition table
/// tests to sweep the full pair matrix.
pub const ALL_STATUSES: [OrderStatus; 15] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Preparing,
    OrderStatus::VendorNoResponse,
    OrderStatus::SearchingRider,
    OrderStatus::RiderAssigned,
    OrderStatus::OnWayToPickup,
    OrderStatus::ReachedPickup,
    OrderStatus::PickedUp,
    OrderStatus::OutForDelivery,
    OrderStatus::ReachedDelivery,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
    OrderStatus::Refunded,
    OrderStatus::Failed,
];
