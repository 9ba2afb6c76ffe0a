//! Order service: the command API over the order and promo streams.

use chrono::Utc;
use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::money::Money;
use crate::pricing::{self, PricingPolicy};
use crate::promo::{PromoCode, PromoQuote, promo_stream_id};

use super::{ChangeStatus, Order, PlaceOrder, RecordRefund};

/// Attempts made when a concurrent writer wins the version check.
pub const MAX_ATTEMPTS: u32 = 3;

/// A freshly placed order and the promo quote it redeemed.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub promo: Option<PromoQuote>,
}

/// What a payment confirmation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment was recorded by this call.
    Captured,
    /// The same payment was already recorded; nothing changed.
    AlreadyCaptured,
}

/// Service for managing orders.
///
/// Every write goes through an optimistic version check. Placing an order
/// with a promo code commits the order stream and the promo stream in one
/// atomic append, so a use is counted if and only if its order exists.
pub struct OrderService<S: EventStore> {
    orders: CommandHandler<S, Order>,
    promos: CommandHandler<S, PromoCode>,
    pricing: PricingPolicy,
}

impl<S: EventStore + Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            promos: self.promos.clone(),
            pricing: self.pricing,
        }
    }
}

impl<S: EventStore + Clone> OrderService<S> {
    /// Creates a new order service with the default pricing policy.
    pub fn new(store: S) -> Self {
        Self::with_pricing(store, PricingPolicy::default())
    }

    pub fn with_pricing(store: S, pricing: PricingPolicy) -> Self {
        Self {
            orders: CommandHandler::new(store.clone()),
            promos: CommandHandler::new(store),
            pricing,
        }
    }
}

impl<S: EventStore> OrderService<S> {
    /// Prices the cart, redeems the promo code if any and records the order.
    ///
    /// When checkouts race on a promo code, exactly one append wins each
    /// round. Losers reload and quote again until the code either accepts
    /// them or reports `ExhaustedUses`; a lost race never surfaces as an
    /// error. Every conflict means a competing append committed, so the loop
    /// always makes progress.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, user_id = %cmd.user_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<PlacedOrder, DomainError> {
        let mut attempt: u32 = 1;
        loop {
            match self.try_place(&cmd).await {
                Err(e) if e.is_conflict() => {
                    metrics::counter!("promo_redemption_conflicts_total").increment(1);
                    tracing::debug!(attempt, "placement lost a version race, retrying");
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }

    async fn try_place(&self, cmd: &PlaceOrder) -> Result<PlacedOrder, DomainError> {
        let undiscounted = pricing::price(&cmd.items, &self.pricing, Money::zero())?;
        let mut order = self.orders.load(cmd.order_id).await?;

        let code = cmd
            .promo_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty());

        let mut redemption = None;
        let mut quote = None;
        if let Some(code) = code {
            let promo_id = promo_stream_id(code);
            let promo = self.promos.load(promo_id).await?;
            let (q, events) =
                promo.redeem(code, cmd.user_id, cmd.order_id, undiscounted.subtotal, Utc::now())?;
            quote = Some(q);
            redemption = Some((promo_id, promo, events));
        }

        let discount = quote.as_ref().map_or(Money::zero(), |q| q.discount);
        let breakdown = pricing::price(&cmd.items, &self.pricing, discount)?;
        let order_events = order.place(cmd, breakdown, quote.as_ref().map(|q| q.code.clone()))?;

        let mut streams = vec![self.orders.stage(cmd.order_id, &order, &order_events)?];
        if let Some((promo_id, promo, events)) = &redemption {
            streams.push(self.promos.stage(*promo_id, promo, events)?);
        }

        let versions = self.orders.store().append_streams(streams).await?;

        order.apply_events(order_events);
        if let Some(version) = versions.first() {
            order.set_version(*version);
        }

        if let Some((promo_id, mut promo, events)) = redemption {
            promo.apply_events(events);
            if let Some(version) = versions.get(1) {
                promo.set_version(*version);
            }
            // The order is committed; a missed snapshot only costs replay time.
            if let Err(e) = self.promos.snapshot_if_due(promo_id, &promo).await {
                tracing::warn!(error = %e, "failed to snapshot promo code");
            }
        }

        metrics::counter!(
            "checkout_orders_created_total",
            "payment_method" => cmd.payment_method.as_str()
        )
        .increment(1);
        tracing::info!(
            total = %order.total(),
            promo = quote.as_ref().map(|q| q.code.as_str()),
            "order placed"
        );

        Ok(PlacedOrder {
            order,
            promo: quote,
        })
    }

    /// Records the gateway order created for an online order.
    #[tracing::instrument(skip(self))]
    pub async fn attach_gateway_order(
        &self,
        order_id: AggregateId,
        gateway_order_id: &str,
    ) -> Result<Order, DomainError> {
        self.orders
            .execute_existing(order_id, MAX_ATTEMPTS, |order| {
                order.attach_gateway_order(gateway_order_id)
            })
            .await
            .map(|result| result.aggregate)
    }

    /// Records a verified payment. Confirming the same payment twice is a
    /// no-op reported as [`PaymentOutcome::AlreadyCaptured`].
    #[tracing::instrument(skip(self))]
    pub async fn confirm_payment(
        &self,
        order_id: AggregateId,
        gateway_order_id: &str,
        gateway_payment_id: &str,
    ) -> Result<(Order, PaymentOutcome), DomainError> {
        let result = self
            .orders
            .execute_existing(order_id, MAX_ATTEMPTS, |order| {
                order.capture_payment(gateway_order_id, gateway_payment_id)
            })
            .await?;

        let outcome = if result.events.is_empty() {
            PaymentOutcome::AlreadyCaptured
        } else {
            PaymentOutcome::Captured
        };
        Ok((result.aggregate, outcome))
    }

    #[tracing::instrument(skip(self))]
    pub async fn mark_payment_failed(
        &self,
        order_id: AggregateId,
        gateway_payment_id: Option<String>,
        reason: &str,
    ) -> Result<Order, DomainError> {
        self.orders
            .execute_existing(order_id, MAX_ATTEMPTS, |order| {
                order.fail_payment(gateway_payment_id.clone(), reason)
            })
            .await
            .map(|result| result.aggregate)
    }

    /// Moves an order along the status table.
    #[tracing::instrument(skip(self))]
    pub async fn change_status(&self, cmd: ChangeStatus) -> Result<Order, DomainError> {
        let result = self
            .orders
            .execute_existing(cmd.order_id, MAX_ATTEMPTS, |order| {
                order.change_status(cmd.target, cmd.actor.as_str(), cmd.reason.clone())
            })
            .await?;
        tracing::info!(status = %result.aggregate.status(), "order status changed");
        Ok(result.aggregate)
    }

    /// Marks a delivered cash-on-delivery order as paid.
    #[tracing::instrument(skip(self))]
    pub async fn record_cash_collected(
        &self,
        order_id: AggregateId,
        collected_by: &str,
    ) -> Result<Order, DomainError> {
        self.orders
            .execute_existing(order_id, MAX_ATTEMPTS, |order| order.collect_cash(collected_by))
            .await
            .map(|result| result.aggregate)
    }

    /// Records a refund the gateway has already accepted.
    #[tracing::instrument(skip(self))]
    pub async fn record_refund(&self, cmd: RecordRefund) -> Result<Order, DomainError> {
        self.orders
            .execute_existing(cmd.order_id, MAX_ATTEMPTS, |order| {
                order.record_refund(&cmd.refund_id, cmd.amount)
            })
            .await
            .map(|result| result.aggregate)
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.orders.load_existing(order_id).await
    }

    /// Loads an order, failing if it doesn't exist.
    pub async fn require_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: Order::aggregate_type(),
                aggregate_id: order_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::{
        AddressId, OrderError, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, UserId,
    };
    use crate::promo::{DiscountRule, PromoDefinition, PromoError, PromoService};
    use chrono::Duration;
    use event_store::InMemoryEventStore;

    fn cart() -> Vec<OrderItem> {
        vec![
            OrderItem::new("SHIRT", 2, Money::from_minor(400)),
            OrderItem::new("CAP", 1, Money::from_minor(400)),
        ]
    }

    fn place_cmd(method: PaymentMethod) -> PlaceOrder {
        PlaceOrder::new(UserId::new(), cart(), AddressId::new("addr-1"), method)
    }

    async fn create_flat_code(store: &InMemoryEventStore, code: &str, max_uses: Option<u32>) {
        let now = Utc::now();
        let mut definition = PromoDefinition::new(
            code,
            DiscountRule::Flat {
                amount: Money::from_minor(100),
            },
            now - Duration::days(1),
            now + Duration::days(1),
        );
        definition.max_uses = max_uses;
        PromoService::new(store.clone())
            .create_code(definition)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn places_order_with_server_side_pricing() {
        let service = OrderService::new(InMemoryEventStore::new());

        let placed = service.place_order(place_cmd(PaymentMethod::Online)).await.unwrap();
        let order = placed.order;

        assert_eq!(order.pricing().subtotal, Money::from_minor(1_200));
        assert_eq!(order.pricing().shipping, Money::from_minor(4_000));
        assert_eq!(order.total(), Money::from_minor(5_200));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert!(placed.promo.is_none());
    }

    #[tokio::test]
    async fn promo_discount_and_usage_are_recorded_together() {
        let store = InMemoryEventStore::new();
        create_flat_code(&store, "FLAT100", Some(5)).await;
        let service = OrderService::new(store.clone());

        let placed = service
            .place_order(place_cmd(PaymentMethod::Online).with_promo_code(" flat100 "))
            .await
            .unwrap();

        assert_eq!(placed.order.pricing().discount, Money::from_minor(100));
        assert_eq!(placed.order.promo_code(), Some("FLAT100"));

        let promo = PromoService::new(store).get("FLAT100").await.unwrap().unwrap();
        assert_eq!(promo.uses_so_far(), 1);
    }

    #[tokio::test]
    async fn rejected_promo_records_nothing() {
        let store = InMemoryEventStore::new();
        let service = OrderService::new(store.clone());
        let cmd = place_cmd(PaymentMethod::Online).with_promo_code("NOPE");
        let order_id = cmd.order_id;

        let result = service.place_order(cmd).await;
        assert!(matches!(
            result,
            Err(DomainError::Promo(PromoError::NotFound { .. }))
        ));
        assert!(service.get_order(order_id).await.unwrap().is_none());
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn blank_promo_code_is_ignored() {
        let service = OrderService::new(InMemoryEventStore::new());
        let placed = service
            .place_order(place_cmd(PaymentMethod::Online).with_promo_code("   "))
            .await
            .unwrap();
        assert!(placed.order.promo_code().is_none());
    }

    async fn race(
        service: &OrderService<InMemoryEventStore>,
        code: &'static str,
        contenders: usize,
    ) -> Vec<Result<PlacedOrder, DomainError>> {
        let tasks: Vec<_> = (0..contenders)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .place_order(place_cmd(PaymentMethod::Online).with_promo_code(code))
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(contenders);
        for task in tasks {
            outcomes.push(task.await.unwrap());
        }
        outcomes
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_use_goes_to_exactly_one_concurrent_checkout() {
        let store = InMemoryEventStore::new();
        create_flat_code(&store, "LAST", Some(1)).await;
        let service = OrderService::new(store.clone());

        let outcomes = race(&service, "LAST", 8).await;

        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        for loser in outcomes.iter().filter(|r| r.is_err()) {
            assert!(matches!(
                loser,
                Err(DomainError::Promo(PromoError::ExhaustedUses { .. }))
            ));
        }

        let promo = PromoService::new(store).get("LAST").await.unwrap().unwrap();
        assert_eq!(promo.uses_so_far(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn contended_uncapped_code_never_rejects_a_checkout() {
        let store = InMemoryEventStore::new();
        create_flat_code(&store, "FLASH", None).await;
        let service = OrderService::new(store.clone());

        let outcomes = race(&service, "FLASH", 32).await;

        for outcome in &outcomes {
            assert!(outcome.is_ok(), "checkout failed: {:?}", outcome.as_ref().err());
        }
        let promo = PromoService::new(store).get("FLASH").await.unwrap().unwrap();
        assert_eq!(promo.uses_so_far(), 32);
    }

    #[tokio::test]
    async fn confirm_payment_is_idempotent() {
        let service = OrderService::new(InMemoryEventStore::new());
        let order_id = service
            .place_order(place_cmd(PaymentMethod::Online))
            .await
            .unwrap()
            .order
            .id()
            .unwrap();
        service.attach_gateway_order(order_id, "order_G1").await.unwrap();

        let (order, first) = service
            .confirm_payment(order_id, "order_G1", "pay_P1")
            .await
            .unwrap();
        assert_eq!(first, PaymentOutcome::Captured);
        assert_eq!(order.status(), OrderStatus::Confirmed);

        let (again, second) = service
            .confirm_payment(order_id, "order_G1", "pay_P1")
            .await
            .unwrap();
        assert_eq!(second, PaymentOutcome::AlreadyCaptured);
        assert_eq!(again.version(), order.version());
    }

    #[tokio::test]
    async fn illegal_status_change_leaves_order_untouched() {
        let service = OrderService::new(InMemoryEventStore::new());
        let order_id = service
            .place_order(place_cmd(PaymentMethod::CashOnDelivery))
            .await
            .unwrap()
            .order
            .id()
            .unwrap();

        let result = service
            .change_status(ChangeStatus::new(order_id, OrderStatus::Shipped, "admin"))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Order(OrderError::IllegalTransition { .. }))
        ));

        let order = service.require_order(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[tokio::test]
    async fn commands_on_unknown_orders_are_not_found() {
        let service = OrderService::new(InMemoryEventStore::new());
        let result = service
            .change_status(ChangeStatus::new(AggregateId::new(), OrderStatus::Cancelled, "admin"))
            .await;
        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
    }

    #[tokio::test]
    async fn replaying_placement_with_same_id_is_rejected() {
        let service = OrderService::new(InMemoryEventStore::new());
        let cmd = place_cmd(PaymentMethod::Online);
        service.place_order(cmd.clone()).await.unwrap();

        assert!(matches!(
            service.place_order(cmd).await,
            Err(DomainError::Order(OrderError::AlreadyPlaced))
        ));
    }
}
