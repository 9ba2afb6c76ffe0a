//! Query side of the shop: read models built from the event stream.
//!
//! A [`ProjectionProcessor`] walks the store's global stream and hands each
//! event to the registered [`Projection`]s whose aggregate type matches,
//! tracking a [`Checkpoint`] per projection. Two views are provided: orders
//! per customer and the promo usage ledger.

pub mod error;
pub mod processor;
pub mod projection;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::{CatchUpReport, ProjectionProcessor};
pub use projection::{Checkpoint, Projection};
pub use views::{CustomerOrdersView, OrderSummary, PromoUsageView};
