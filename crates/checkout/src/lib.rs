//! Checkout, payment confirmation and refunds.
//!
//! This crate sits between the order domain and the outside world:
//!
//! 1. [`CheckoutCoordinator`] prices a cart from the catalog, reserves stock,
//!    places the order (redeeming any promo code atomically) and, for online
//!    payment, opens a gateway order.
//! 2. [`PaymentVerifier`] checks gateway signatures and records captures from
//!    shopper callbacks and webhooks.
//! 3. [`RefundCoordinator`] refunds paid orders through the gateway.
//!
//! Gateway access goes through [`PaymentGatewayAdapter`], which makes order
//! creation idempotent per key and bounds every call with a timeout.

pub mod adapter;
pub mod coordinator;
pub mod error;
pub mod payment;
pub mod refund;
pub mod services;
pub mod signature;

pub use adapter::PaymentGatewayAdapter;
pub use coordinator::{CartLine, CheckoutCoordinator, CheckoutRequest, CheckoutResult};
pub use error::{CheckoutError, GatewayError, PaymentError, RefundError};
pub use payment::{PaymentVerifier, WebhookOutcome};
pub use refund::{RefundCoordinator, RefundInitiated};
pub use services::{
    Address, AddressBook, Catalog, HttpGatewayConfig, HttpPaymentGateway, InMemoryAddressBook,
    InMemoryCatalog, InMemoryPaymentGateway, PaymentGateway, RemoteOrder, RemoteRefund,
};
pub use signature::{SignatureVerifier, Verification};
