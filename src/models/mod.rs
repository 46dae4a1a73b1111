// Data layer: the order aggregate and its append-only side records.

pub mod order;
pub mod refund_request;
pub mod status_history;

pub use order::{
    GeoPoint, Order, PaymentConfirmation, PaymentMethod, RejectionReason, Rider, Vendor,
    VendorResponse,
};
pub use refund_request::RefundRequest;
pub use status_history::OrderStatusHistory;
