//! Route handlers, grouped by audience.

pub mod admin;
pub mod checkout;
pub mod ops;
pub mod orders;
pub mod payments;
pub mod promos;

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    AddressId, Aggregate, Order, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    PriceBreakdown, UserId,
};
use serde::Serialize;

use crate::error::ApiError;

/// An order as returned by every endpoint that changes or reads one.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: AggregateId,
    pub user_id: Option<UserId>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub items: Vec<OrderItem>,
    pub pricing: PriceBreakdown,
    pub promo_code: Option<String>,
    pub shipping_address_id: Option<AddressId>,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub refund_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderResponse {
    pub fn from_order(order: &Order) -> Result<Self, ApiError> {
        let id = order
            .id()
            .ok_or_else(|| ApiError::Internal("order loaded without an id".to_string()))?;

        Ok(Self {
            id,
            user_id: order.user_id(),
            status: order.status(),
            payment_status: order.payment_status(),
            payment_method: order.payment_method(),
            items: order.items().to_vec(),
            pricing: *order.pricing(),
            promo_code: order.promo_code().map(str::to_string),
            shipping_address_id: order.shipping_address_id().cloned(),
            gateway_order_id: order.gateway_order_id().map(str::to_string),
            gateway_payment_id: order.gateway_payment_id().map(str::to_string),
            refund_id: order.refund_id().map(str::to_string),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        })
    }
}

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    Ok(AggregateId::from_uuid(uuid))
}

pub(crate) fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    let uuid = uuid::Uuid::parse_str(id)
        .map_err(|e| ApiError::BadRequest(format!("Invalid user ID format: {e}")))?;
    Ok(UserId::from_uuid(uuid))
}
