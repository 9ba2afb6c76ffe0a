//! Customer orders read model: each user's orders with their current status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Aggregate, Money, Order, OrderEvent, OrderStatus, PaymentMethod, PaymentStatus, UserId,
};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::Projection;

/// One order as listed in a user's order history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub item_count: u32,
    pub total: Money,
    pub promo_code: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct CustomerOrdersState {
    orders: HashMap<AggregateId, OrderSummary>,
    by_user: HashMap<UserId, Vec<AggregateId>>,
}

/// Read model view of orders grouped by user.
#[derive(Clone)]
pub struct CustomerOrdersView {
    state: Arc<RwLock<CustomerOrdersState>>,
}

impl CustomerOrdersView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CustomerOrdersState {
                orders: HashMap::new(),
                by_user: HashMap::new(),
            })),
        }
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Option<OrderSummary> {
        self.state.read().await.orders.get(&order_id).cloned()
    }

    /// A user's orders, newest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Vec<OrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .by_user
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| state.orders.get(id).cloned())
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }

    /// What a user has paid and not been refunded.
    pub async fn total_spent(&self, user_id: UserId) -> Money {
        self.orders_for_user(user_id)
            .await
            .iter()
            .filter(|o| o.payment_status == PaymentStatus::Paid)
            .map(|o| o.total)
            .sum()
    }
}

impl Default for CustomerOrdersView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    fn handles(&self, aggregate_type: &str) -> bool {
        aggregate_type == Order::aggregate_type()
    }

    async fn apply(&self, event: &EventEnvelope) -> Result<()> {
        let order_event: OrderEvent = serde_json::from_value(event.payload.clone())?;
        let order_id = event.aggregate_id;
        let at = order_event.occurred_at();

        let mut state = self.state.write().await;

        if let OrderEvent::OrderPlaced(data) = &order_event {
            let summary = OrderSummary {
                order_id,
                user_id: data.user_id,
                status: OrderStatus::Pending,
                payment_status: data.payment_status,
                payment_method: data.payment_method,
                item_count: data.items.iter().map(|item| item.quantity).sum(),
                total: data.pricing.total,
                promo_code: data.promo_code.clone(),
                placed_at: data.placed_at,
                updated_at: data.placed_at,
            };
            state.orders.insert(order_id, summary);
            state.by_user.entry(data.user_id).or_default().push(order_id);
        } else if let Some(summary) = state.orders.get_mut(&order_id) {
            match order_event {
                OrderEvent::PaymentCaptured(_) => {
                    summary.payment_status = PaymentStatus::Paid;
                    if summary.status == OrderStatus::Pending {
                        summary.status = OrderStatus::Confirmed;
                    }
                }
                OrderEvent::PaymentFailed(_) => summary.payment_status = PaymentStatus::Failed,
                OrderEvent::StatusChanged(data) => summary.status = data.to,
                OrderEvent::CashCollected(_) => summary.payment_status = PaymentStatus::Paid,
                OrderEvent::PaymentRefunded(_) => summary.payment_status = PaymentStatus::Refunded,
                OrderEvent::OrderPlaced(_) | OrderEvent::GatewayOrderAttached(_) => {}
            }
            summary.updated_at = at;
        }

        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.by_user.clear();
        Ok(())
    }
}
