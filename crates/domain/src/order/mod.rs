//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use commands::*;
pub use events::{
    CashCollectedData, GatewayOrderAttachedData, OrderEvent, OrderPlacedData, PaymentCapturedData,
    PaymentFailedData, PaymentRefundedData, StatusChangedData,
};
pub use service::{OrderService, PaymentOutcome, PlacedOrder};
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{AddressId, OrderItem, PaymentMethod, ProductId, UserId};

use thiserror::Error;

use crate::money::Money;

/// Errors raised by order commands. A rejected command never changes state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has no items")]
    NoItems,

    #[error("Order totals are inconsistent")]
    InconsistentTotals,

    /// The status transition table has no such edge.
    #[error("Illegal transition: {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("Illegal payment transition: {from} -> {to}")]
    IllegalPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Online orders cannot be confirmed before the payment is captured.
    #[error("Order cannot be confirmed while payment is {payment_status}")]
    AwaitingPayment { payment_status: PaymentStatus },

    #[error("Order uses {0} payment")]
    WrongPaymentMethod(PaymentMethod),

    #[error("Gateway order already attached: {existing}")]
    GatewayOrderAlreadyAttached { existing: String },

    #[error("No gateway order attached")]
    NoGatewayOrder,

    #[error("Gateway order {actual} does not belong to this order")]
    GatewayOrderMismatch { actual: String },

    /// A second, different payment arrived for an order that is already paid.
    #[error("Order already paid with {existing}")]
    PaymentConflict { existing: String },

    #[error("Only full refunds are supported: requested {requested}, total {total}")]
    PartialRefundUnsupported { requested: Money, total: Money },

    #[error("Order has no gateway payment to refund")]
    NoGatewayPayment,
}
