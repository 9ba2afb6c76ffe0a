//! Order commands.

use common::AggregateId;

use crate::money::Money;

use super::{AddressId, OrderItem, OrderStatus, PaymentMethod, UserId};

/// Command to place a new order from a priced cart.
///
/// `items` must carry current catalog prices; the order service computes the
/// totals itself and never trusts a client-supplied total.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The order ID to create.
    pub order_id: AggregateId,

    pub user_id: UserId,

    pub items: Vec<OrderItem>,

    /// Promo code as typed by the shopper, if any.
    pub promo_code: Option<String>,

    pub payment_method: PaymentMethod,

    pub shipping_address_id: AddressId,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder command with a generated order ID.
    pub fn new(
        user_id: UserId,
        items: Vec<OrderItem>,
        shipping_address_id: AddressId,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            order_id: AggregateId::new(),
            user_id,
            items,
            promo_code: None,
            payment_method,
            shipping_address_id,
        }
    }

    pub fn with_order_id(mut self, order_id: AggregateId) -> Self {
        self.order_id = order_id;
        self
    }

    pub fn with_promo_code(mut self, code: impl Into<String>) -> Self {
        self.promo_code = Some(code.into());
        self
    }
}

/// Command to move an order to a new fulfillment status.
#[derive(Debug, Clone)]
pub struct ChangeStatus {
    pub order_id: AggregateId,

    pub target: OrderStatus,

    /// Who is asking, recorded on the event.
    pub actor: String,

    pub reason: Option<String>,
}

impl ChangeStatus {
    pub fn new(order_id: AggregateId, target: OrderStatus, actor: impl Into<String>) -> Self {
        Self {
            order_id,
            target,
            actor: actor.into(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Command to record a verified gateway payment.
#[derive(Debug, Clone)]
pub struct CapturePayment {
    pub order_id: AggregateId,

    pub gateway_order_id: String,

    pub gateway_payment_id: String,
}

impl CapturePayment {
    pub fn new(
        order_id: AggregateId,
        gateway_order_id: impl Into<String>,
        gateway_payment_id: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            gateway_order_id: gateway_order_id.into(),
            gateway_payment_id: gateway_payment_id.into(),
        }
    }
}

/// Command to record a refund accepted by the gateway.
#[derive(Debug, Clone)]
pub struct RecordRefund {
    pub order_id: AggregateId,

    pub refund_id: String,

    pub amount: Money,
}

impl RecordRefund {
    pub fn new(order_id: AggregateId, refund_id: impl Into<String>, amount: Money) -> Self {
        Self {
            order_id,
            refund_id: refund_id.into(),
            amount,
        }
    }
}
