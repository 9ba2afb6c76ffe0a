//! Read model views for the CQRS query side.

pub mod customer_orders;
pub mod promo_usage;

pub use customer_orders::{CustomerOrdersView, OrderSummary};
pub use promo_usage::PromoUsageView;
