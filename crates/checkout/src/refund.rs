//! Refund coordinator.

use common::AggregateId;
use domain::{Money, Order, OrderService, RecordRefund};
use event_store::EventStore;

use crate::adapter::PaymentGatewayAdapter;
use crate::error::RefundError;
use crate::services::PaymentGateway;

/// A refund accepted by the gateway and recorded on the order.
#[derive(Debug, Clone)]
pub struct RefundInitiated {
    pub refund_id: String,
    pub amount: Money,
    pub order: Order,
}

/// Refunds paid online orders through the gateway.
///
/// The gateway call uses the key `refund-{order_id}`, so a retry after a lost
/// response gets the same refund back instead of a second one.
pub struct RefundCoordinator<S: EventStore, G> {
    orders: OrderService<S>,
    gateway: PaymentGatewayAdapter<G>,
}

impl<S: EventStore + Clone, G: Clone> Clone for RefundCoordinator<S, G> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<S: EventStore, G: PaymentGateway> RefundCoordinator<S, G> {
    pub fn new(orders: OrderService<S>, gateway: PaymentGatewayAdapter<G>) -> Self {
        Self { orders, gateway }
    }

    /// Refunds the full order total.
    ///
    /// The order is checked before the gateway is called, and only changes
    /// once the gateway has accepted the refund.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: AggregateId,
        amount: Money,
    ) -> Result<RefundInitiated, RefundError> {
        let order = self.orders.require_order(order_id).await?;
        let payment_id = match order.check_refundable(amount) {
            Ok(payment_id) => payment_id.to_string(),
            Err(e) => {
                metrics::counter!("refunds_total", "outcome" => "not_refundable").increment(1);
                return Err(RefundError::NotRefundable(e));
            }
        };

        let key = format!("refund-{order_id}");
        let remote = match self.gateway.refund(&payment_id, amount, &key).await {
            Ok(remote) => remote,
            Err(e) => {
                metrics::counter!("refunds_total", "outcome" => "gateway_error").increment(1);
                tracing::error!(error = %e, "gateway refused refund");
                return Err(e.into());
            }
        };

        let order = self
            .orders
            .record_refund(RecordRefund::new(order_id, remote.id.clone(), amount))
            .await?;

        metrics::counter!("refunds_total", "outcome" => "refunded").increment(1);
        tracing::info!(refund_id = %remote.id, %amount, "order refunded");

        Ok(RefundInitiated {
            refund_id: remote.id,
            amount,
            order,
        })
    }
}
