//! Checkout error types.

use common::AggregateId;
use domain::{AddressId, DomainError, OrderError, ProductId, PromoError};
use thiserror::Error;

/// Errors returned by a payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway could not be reached in time. Safe to retry.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway refused the request.
    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Errors raised while building an order from a cart.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid cart: {0}")]
    InvalidCart(String),

    #[error("Address {0} not found")]
    AddressNotFound(AddressId),

    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Promo code rejected: {0}")]
    PromoInvalid(PromoError),

    /// The order exists but no gateway order could be created. Retrying the
    /// checkout with the same id resumes from here.
    #[error("Payment gateway unavailable for order {order_id}: {reason}")]
    GatewayUnavailable { order_id: AggregateId, reason: String },

    #[error("Payment gateway rejected order {order_id}: {reason}")]
    GatewayRejected { order_id: AggregateId, reason: String },

    /// The checkout id is already used by an order of another user.
    #[error("Checkout {0} belongs to another order")]
    CheckoutIdConflict(AggregateId),

    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl From<DomainError> for CheckoutError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Promo(e) => CheckoutError::PromoInvalid(e),
            DomainError::Pricing(e) => CheckoutError::InvalidCart(e.to_string()),
            DomainError::Order(OrderError::NoItems) => CheckoutError::EmptyCart,
            other => CheckoutError::Domain(other),
        }
    }
}

/// Errors raised while confirming a payment.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The signature does not match. Nothing was recorded.
    #[error("Payment verification failed")]
    VerificationFailed,

    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Errors raised while refunding an order.
#[derive(Debug, Error)]
pub enum RefundError {
    /// The order's state does not allow this refund.
    #[error("Refund not allowed: {0}")]
    NotRefundable(OrderError),

    /// The gateway did not accept the refund. The order is unchanged.
    #[error("Refund failed at the gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Domain error: {0}")]
    Domain(DomainError),
}

impl From<DomainError> for RefundError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Order(e) => RefundError::NotRefundable(e),
            other => RefundError::Domain(other),
        }
    }
}
