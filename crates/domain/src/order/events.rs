//! Order domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;
use crate::pricing::PriceBreakdown;

use super::{AddressId, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, UserId};

/// Events recorded on an order stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// The order was built from a priced cart.
    OrderPlaced(OrderPlacedData),

    /// A gateway order was created for online payment.
    GatewayOrderAttached(GatewayOrderAttachedData),

    /// The gateway captured the payment.
    PaymentCaptured(PaymentCapturedData),

    /// The gateway reported a failed payment attempt.
    PaymentFailed(PaymentFailedData),

    /// Fulfillment status moved along the transition table.
    StatusChanged(StatusChangedData),

    /// Cash was collected for a cash-on-delivery order.
    CashCollected(CashCollectedData),

    /// The gateway refunded the payment.
    PaymentRefunded(PaymentRefundedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::GatewayOrderAttached(_) => "GatewayOrderAttached",
            OrderEvent::PaymentCaptured(_) => "PaymentCaptured",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::CashCollected(_) => "CashCollected",
            OrderEvent::PaymentRefunded(_) => "PaymentRefunded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub pricing: PriceBreakdown,
    /// Normalized promo code, if one was redeemed.
    pub promo_code: Option<String>,
    pub payment_method: PaymentMethod,
    /// `Pending` for online orders, `CodPending` for cash on delivery.
    pub payment_status: PaymentStatus,
    pub shipping_address_id: AddressId,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrderAttachedData {
    pub gateway_order_id: String,
    pub attached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCapturedData {
    pub gateway_payment_id: String,
    pub amount: Money,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub gateway_payment_id: Option<String>,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Who asked for the change, e.g. "admin", "customer" or "gateway".
    pub actor: String,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashCollectedData {
    pub amount: Money,
    pub collected_by: String,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub refund_id: String,
    pub amount: Money,
    pub refunded_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn gateway_order_attached(gateway_order_id: impl Into<String>) -> Self {
        OrderEvent::GatewayOrderAttached(GatewayOrderAttachedData {
            gateway_order_id: gateway_order_id.into(),
            attached_at: Utc::now(),
        })
    }

    pub fn payment_captured(gateway_payment_id: impl Into<String>, amount: Money) -> Self {
        OrderEvent::PaymentCaptured(PaymentCapturedData {
            gateway_payment_id: gateway_payment_id.into(),
            amount,
            captured_at: Utc::now(),
        })
    }

    pub fn payment_failed(gateway_payment_id: Option<String>, reason: impl Into<String>) -> Self {
        OrderEvent::PaymentFailed(PaymentFailedData {
            gateway_payment_id,
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }

    pub fn status_changed(
        from: OrderStatus,
        to: OrderStatus,
        actor: impl Into<String>,
        reason: Option<String>,
    ) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            actor: actor.into(),
            reason,
            changed_at: Utc::now(),
        })
    }

    pub fn cash_collected(amount: Money, collected_by: impl Into<String>) -> Self {
        OrderEvent::CashCollected(CashCollectedData {
            amount,
            collected_by: collected_by.into(),
            collected_at: Utc::now(),
        })
    }

    pub fn payment_refunded(refund_id: impl Into<String>, amount: Money) -> Self {
        OrderEvent::PaymentRefunded(PaymentRefundedData {
            refund_id: refund_id.into(),
            amount,
            refunded_at: Utc::now(),
        })
    }

    /// Timestamp the event carries, used as the order's `updated_at`.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(d) => d.placed_at,
            OrderEvent::GatewayOrderAttached(d) => d.attached_at,
            OrderEvent::PaymentCaptured(d) => d.captured_at,
            OrderEvent::PaymentFailed(d) => d.failed_at,
            OrderEvent::StatusChanged(d) => d.changed_at,
            OrderEvent::CashCollected(d) => d.collected_at,
            OrderEvent::PaymentRefunded(d) => d.refunded_at,
        }
    }
}
