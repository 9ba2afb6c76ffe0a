//! Domain layer for the checkout system.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits plus a command handler over the event store
//! - Money and the pricing engine
//! - The Order aggregate with its fulfillment and payment state machines
//! - Promo codes with atomic usage counting

pub mod aggregate;
pub mod command;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod promo;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use command::{CommandHandler, CommandResult};
pub use error::DomainError;
pub use money::Money;
pub use order::{
    AddressId, CapturePayment, ChangeStatus, Order, OrderError, OrderEvent, OrderItem,
    OrderPlacedData, OrderService, OrderStatus, PaymentMethod, PaymentOutcome, PaymentStatus,
    PlaceOrder, PlacedOrder, ProductId, RecordRefund, UserId,
};
pub use pricing::{PriceBreakdown, PricingError, PricingPolicy, ShippingPolicy};
pub use promo::{
    DiscountRule, PromoCode, PromoCodeUsage, PromoDefinition, PromoError, PromoEvent, PromoQuote,
    PromoService, normalize_code, promo_stream_id,
};
