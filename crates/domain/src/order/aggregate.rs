//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::money::Money;
use crate::pricing::PriceBreakdown;

use super::{
    AddressId, OrderError, OrderEvent, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    PlaceOrder, UserId,
    events::{OrderPlacedData, StatusChangedData},
};

/// Order aggregate root.
///
/// Status and payment status change only through the command methods below,
/// each of which validates against the state machine and returns the events
/// to record. Rejected commands return an error and no events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    #[serde(default)]
    version: Version,

    user_id: Option<UserId>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    items: Vec<OrderItem>,
    pricing: PriceBreakdown,
    promo_code: Option<String>,
    shipping_address_id: Option<AddressId>,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    refund_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        self.updated_at = Some(event.occurred_at());
        match event {
            OrderEvent::OrderPlaced(data) => self.apply_placed(data),
            OrderEvent::GatewayOrderAttached(data) => {
                self.gateway_order_id = Some(data.gateway_order_id);
            }
            OrderEvent::PaymentCaptured(data) => {
                self.payment_status = PaymentStatus::Paid;
                self.gateway_payment_id = Some(data.gateway_payment_id);
                // Capture confirms a pending order in the same step.
                if self.status == OrderStatus::Pending {
                    self.status = OrderStatus::Confirmed;
                }
            }
            OrderEvent::PaymentFailed(_) => {
                self.payment_status = PaymentStatus::Failed;
            }
            OrderEvent::StatusChanged(data) => self.apply_status_changed(data),
            OrderEvent::CashCollected(_) => {
                self.payment_status = PaymentStatus::Paid;
            }
            OrderEvent::PaymentRefunded(data) => {
                self.payment_status = PaymentStatus::Refunded;
                self.refund_id = Some(data.refund_id);
            }
        }
    }
}

// Query methods
impl Order {
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// Returns true if `user_id` placed this order.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == Some(user_id)
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        self.payment_method
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn pricing(&self) -> &PriceBreakdown {
        &self.pricing
    }

    pub fn total(&self) -> Money {
        self.pricing.total
    }

    pub fn promo_code(&self) -> Option<&str> {
        self.promo_code.as_deref()
    }

    pub fn shipping_address_id(&self) -> Option<&AddressId> {
        self.shipping_address_id.as_ref()
    }

    pub fn gateway_order_id(&self) -> Option<&str> {
        self.gateway_order_id.as_deref()
    }

    pub fn gateway_payment_id(&self) -> Option<&str> {
        self.gateway_payment_id.as_deref()
    }

    pub fn refund_id(&self) -> Option<&str> {
        self.refund_id.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn is_online(&self) -> bool {
        self.payment_method == Some(PaymentMethod::Online)
    }

    fn require_method(&self, method: PaymentMethod) -> Result<(), OrderError> {
        match self.payment_method {
            Some(actual) if actual != method => Err(OrderError::WrongPaymentMethod(actual)),
            _ => Ok(()),
        }
    }

    fn require_payment_transition(&self, to: PaymentStatus) -> Result<(), OrderError> {
        if self.payment_status.can_transition_to(to) {
            Ok(())
        } else {
            Err(OrderError::IllegalPaymentTransition {
                from: self.payment_status,
                to,
            })
        }
    }
}

// Command methods (return events)
impl Order {
    /// Records a new order from an already-priced cart.
    pub fn place(
        &self,
        cmd: &PlaceOrder,
        pricing: PriceBreakdown,
        promo_code: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyPlaced);
        }
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if !pricing.is_consistent() {
            return Err(OrderError::InconsistentTotals);
        }

        let payment_status = match cmd.payment_method {
            PaymentMethod::Online => PaymentStatus::Pending,
            PaymentMethod::CashOnDelivery => PaymentStatus::CodPending,
        };

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            items: cmd.items.clone(),
            pricing,
            promo_code,
            payment_method: cmd.payment_method,
            payment_status,
            shipping_address_id: cmd.shipping_address_id.clone(),
            placed_at: Utc::now(),
        })])
    }

    /// Records the gateway order created for this order.
    ///
    /// Attaching the same id again is a no-op; a different id is rejected.
    pub fn attach_gateway_order(
        &self,
        gateway_order_id: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_method(PaymentMethod::Online)?;

        match self.gateway_order_id.as_deref() {
            Some(existing) if existing == gateway_order_id => Ok(vec![]),
            Some(existing) => Err(OrderError::GatewayOrderAlreadyAttached {
                existing: existing.to_string(),
            }),
            None => Ok(vec![OrderEvent::gateway_order_attached(gateway_order_id)]),
        }
    }

    /// Marks a verified gateway payment as captured.
    ///
    /// Re-capturing with the same payment id is a no-op, so replayed
    /// verifications and duplicate webhooks converge on a single event.
    pub fn capture_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_method(PaymentMethod::Online)?;

        let attached = self
            .gateway_order_id
            .as_deref()
            .ok_or(OrderError::NoGatewayOrder)?;
        if attached != gateway_order_id {
            return Err(OrderError::GatewayOrderMismatch {
                actual: gateway_order_id.to_string(),
            });
        }

        if self.payment_status.is_settled() {
            return match self.gateway_payment_id.as_deref() {
                Some(existing) if existing == gateway_payment_id => Ok(vec![]),
                Some(existing) => Err(OrderError::PaymentConflict {
                    existing: existing.to_string(),
                }),
                None => Err(OrderError::IllegalPaymentTransition {
                    from: self.payment_status,
                    to: PaymentStatus::Paid,
                }),
            };
        }

        self.require_payment_transition(PaymentStatus::Paid)?;
        Ok(vec![OrderEvent::payment_captured(
            gateway_payment_id,
            self.total(),
        )])
    }

    /// Records a failed gateway payment attempt.
    pub fn fail_payment(
        &self,
        gateway_payment_id: Option<String>,
        reason: impl Into<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_method(PaymentMethod::Online)?;

        if self.payment_status == PaymentStatus::Failed {
            return Ok(vec![]);
        }
        self.require_payment_transition(PaymentStatus::Failed)?;
        Ok(vec![OrderEvent::payment_failed(gateway_payment_id, reason)])
    }

    /// Moves fulfillment status along the transition table.
    pub fn change_status(
        &self,
        target: OrderStatus,
        actor: impl Into<String>,
        reason: Option<String>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !self.status.can_transition_to(target) {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to: target,
            });
        }

        if target == OrderStatus::Confirmed
            && self.is_online()
            && self.payment_status != PaymentStatus::Paid
        {
            return Err(OrderError::AwaitingPayment {
                payment_status: self.payment_status,
            });
        }

        Ok(vec![OrderEvent::status_changed(
            self.status,
            target,
            actor,
            reason,
        )])
    }

    /// Marks a cash-on-delivery order as paid once the courier has the cash.
    pub fn collect_cash(&self, collected_by: impl Into<String>) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_method(PaymentMethod::CashOnDelivery)?;

        if !matches!(
            self.status,
            OrderStatus::Delivered | OrderStatus::ReturnRequested | OrderStatus::Returned
        ) {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to: OrderStatus::Delivered,
            });
        }
        self.require_payment_transition(PaymentStatus::Paid)?;
        Ok(vec![OrderEvent::cash_collected(self.total(), collected_by)])
    }

    /// Checks that a full refund of `amount` may be requested from the gateway
    /// and returns the gateway payment to refund.
    pub fn check_refundable(&self, amount: Money) -> Result<&str, OrderError> {
        self.require_payment_transition(PaymentStatus::Refunded)?;
        if amount != self.total() {
            return Err(OrderError::PartialRefundUnsupported {
                requested: amount,
                total: self.total(),
            });
        }
        self.gateway_payment_id
            .as_deref()
            .ok_or(OrderError::NoGatewayPayment)
    }

    /// Records a refund the gateway has accepted.
    pub fn record_refund(
        &self,
        refund_id: &str,
        amount: Money,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.payment_status == PaymentStatus::Refunded
            && self.refund_id.as_deref() == Some(refund_id)
        {
            return Ok(vec![]);
        }
        self.check_refundable(amount)?;
        Ok(vec![OrderEvent::payment_refunded(refund_id, amount)])
    }
}

// Apply event helpers
impl Order {
    fn apply_placed(&mut self, data: OrderPlacedData) {
        self.id = Some(data.order_id);
        self.user_id = Some(data.user_id);
        self.status = OrderStatus::Pending;
        self.payment_status = data.payment_status;
        self.payment_method = Some(data.payment_method);
        self.items = data.items;
        self.pricing = data.pricing;
        self.promo_code = data.promo_code;
        self.shipping_address_id = Some(data.shipping_address_id);
        self.created_at = Some(data.placed_at);
    }

    fn apply_status_changed(&mut self, data: StatusChangedData) {
        self.status = data.to;
    }
}
