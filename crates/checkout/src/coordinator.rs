//! Checkout coordinator: turns a cart into a placed order.

use std::time::Instant;

use common::AggregateId;
use domain::{
    AddressId, Aggregate, DomainError, Order, OrderError, OrderItem, OrderService, PaymentMethod,
    PlaceOrder, ProductId, PromoQuote, UserId,
};
use event_store::EventStore;
use serde::{Deserialize, Serialize};

use crate::adapter::PaymentGatewayAdapter;
use crate::error::{CheckoutError, GatewayError};
use crate::services::{AddressBook, Catalog, PaymentGateway};

/// A cart line as submitted by the shopper. Carries no price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl CartLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            size: None,
            color: None,
        }
    }

    pub fn with_variant(mut self, size: Option<String>, color: Option<String>) -> Self {
        self.size = size;
        self.color = color;
        self
    }
}

/// Everything needed to check out a cart.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub items: Vec<CartLine>,
    pub address_id: AddressId,
    pub promo_code: Option<String>,
    pub payment_method: PaymentMethod,
    /// Client-chosen id making the request safe to retry. It becomes the
    /// order id.
    pub checkout_id: Option<AggregateId>,
}

impl CheckoutRequest {
    pub fn new(
        user_id: UserId,
        items: Vec<CartLine>,
        address_id: impl Into<AddressId>,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            user_id,
            items,
            address_id: address_id.into(),
            promo_code: None,
            payment_method,
            checkout_id: None,
        }
    }

    pub fn with_promo_code(mut self, code: impl Into<String>) -> Self {
        self.promo_code = Some(code.into());
        self
    }

    pub fn with_checkout_id(mut self, checkout_id: AggregateId) -> Self {
        self.checkout_id = Some(checkout_id);
        self
    }
}

/// Outcome of a checkout.
#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub order: Order,
    /// Set for online orders: the shopper pays against this id.
    pub gateway_order_id: Option<String>,
    pub promo: Option<PromoQuote>,
    /// True when the checkout id had already produced this order.
    pub replayed: bool,
}

/// Builds orders from carts.
///
/// Prices come from the catalog at checkout time, never from the client.
/// Stock is reserved before the order is recorded and released again if the
/// order cannot be placed. Online orders get a gateway order keyed by the
/// order id, so retries never open a second one.
pub struct CheckoutCoordinator<S, C, A, G>
where
    S: EventStore,
{
    orders: OrderService<S>,
    catalog: C,
    addresses: A,
    gateway: PaymentGatewayAdapter<G>,
}

impl<S, C, A, G> Clone for CheckoutCoordinator<S, C, A, G>
where
    S: EventStore + Clone,
    C: Clone,
    A: Clone,
    G: Clone,
{
    fn clone(&self) -> Self {
        Self {
            orders: self.orders.clone(),
            catalog: self.catalog.clone(),
            addresses: self.addresses.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<S, C, A, G> CheckoutCoordinator<S, C, A, G>
where
    S: EventStore,
    C: Catalog,
    A: AddressBook,
    G: PaymentGateway,
{
    pub fn new(
        orders: OrderService<S>,
        catalog: C,
        addresses: A,
        gateway: PaymentGatewayAdapter<G>,
    ) -> Self {
        Self {
            orders,
            catalog,
            addresses,
            gateway,
        }
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    /// Checks out a cart.
    #[tracing::instrument(
        skip(self, request),
        fields(user_id = %request.user_id, method = %request.payment_method)
    )]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, CheckoutError> {
        let start = Instant::now();
        let result = self.run(request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("checkout_failures_total", "reason" => failure_reason(e))
                .increment(1);
            tracing::warn!(error = %e, "checkout failed");
        }
        result
    }

    async fn run(&self, request: CheckoutRequest) -> Result<CheckoutResult, CheckoutError> {
        validate_cart(&request.items)?;

        self.addresses
            .get_address(&request.address_id, request.user_id)
            .await?
            .ok_or_else(|| CheckoutError::AddressNotFound(request.address_id.clone()))?;

        if let Some(checkout_id) = request.checkout_id
            && let Some(existing) = self.orders.get_order(checkout_id).await?
        {
            return self.resume(existing, request.user_id).await;
        }

        let items = self.price_cart(&request.items).await?;
        self.reserve(&items).await?;

        let order_id = request.checkout_id.unwrap_or_else(AggregateId::new);
        let mut cmd = PlaceOrder::new(
            request.user_id,
            items.clone(),
            request.address_id.clone(),
            request.payment_method,
        )
        .with_order_id(order_id);
        if let Some(code) = &request.promo_code {
            cmd = cmd.with_promo_code(code.clone());
        }

        let placed = match self.orders.place_order(cmd).await {
            Ok(placed) => placed,
            Err(e) => {
                self.release(&items).await;
                // A concurrent retry with the same checkout id got there first.
                if matches!(e, DomainError::Order(OrderError::AlreadyPlaced)) {
                    let existing = self.orders.require_order(order_id).await?;
                    return self.resume(existing, request.user_id).await;
                }
                return Err(e.into());
            }
        };
        let (order, gateway_order_id) = match request.payment_method {
            PaymentMethod::Online => {
                let (order, gateway_order_id) = self.open_payment(placed.order).await?;
                (order, Some(gateway_order_id))
            }
            PaymentMethod::CashOnDelivery => (placed.order, None),
        };

        Ok(CheckoutResult {
            order,
            gateway_order_id,
            promo: placed.promo,
            replayed: false,
        })
    }

    /// Returns an order created by an earlier attempt with the same checkout
    /// id, finishing its gateway order if that step failed last time.
    async fn resume(&self, order: Order, user_id: UserId) -> Result<CheckoutResult, CheckoutError> {
        let order_id = order_id(&order)?;
        if !order.is_owned_by(user_id) {
            return Err(CheckoutError::CheckoutIdConflict(order_id));
        }
        tracing::info!(%order_id, "checkout replayed");

        let promo = order.promo_code().map(|code| PromoQuote {
            code: code.to_string(),
            discount: order.pricing().discount,
        });

        let attached = order.gateway_order_id().map(str::to_string);
        let (order, gateway_order_id) = match (order.payment_method(), attached) {
            (Some(PaymentMethod::Online), Some(existing)) => (order, Some(existing)),
            (Some(PaymentMethod::Online), None) => {
                let (order, gateway_order_id) = self.open_payment(order).await?;
                (order, Some(gateway_order_id))
            }
            _ => (order, None),
        };

        Ok(CheckoutResult {
            order,
            gateway_order_id,
            promo,
            replayed: true,
        })
    }

    /// Creates the gateway order for a placed online order and records it.
    ///
    /// On failure the order stays placed and unpaid.
    async fn open_payment(&self, order: Order) -> Result<(Order, String), CheckoutError> {
        let order_id = order_id(&order)?;
        let key = order_id.to_string();

        let gateway_order_id = self
            .gateway
            .create_remote_order(order_id, order.total(), &key)
            .await
            .map_err(|e| match e {
                GatewayError::Unavailable(reason) => {
                    CheckoutError::GatewayUnavailable { order_id, reason }
                }
                GatewayError::Rejected(reason) => CheckoutError::GatewayRejected { order_id, reason },
            })?;

        let order = self
            .orders
            .attach_gateway_order(order_id, &gateway_order_id)
            .await?;
        // The order now carries the id, so replays read it from there.
        self.gateway.forget(&key).await;
        Ok((order, gateway_order_id))
    }

    async fn price_cart(&self, lines: &[CartLine]) -> Result<Vec<OrderItem>, CheckoutError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let unit_price = self.catalog.current_price(&line.product_id).await?;
            items.push(
                OrderItem::new(line.product_id.clone(), line.quantity, unit_price)
                    .with_variant(line.size.clone(), line.color.clone()),
            );
        }
        Ok(items)
    }

    /// Reserves every line or none of them.
    async fn reserve(&self, items: &[OrderItem]) -> Result<(), CheckoutError> {
        for (index, item) in items.iter().enumerate() {
            if let Err(e) = self
                .catalog
                .reserve_stock(&item.product_id, item.quantity)
                .await
            {
                self.release(&items[..index]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn release(&self, items: &[OrderItem]) {
        for item in items {
            if let Err(e) = self
                .catalog
                .release_stock(&item.product_id, item.quantity)
                .await
            {
                tracing::warn!(
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    error = %e,
                    "failed to release reserved stock"
                );
            }
        }
    }
}

fn validate_cart(lines: &[CartLine]) -> Result<(), CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
        return Err(CheckoutError::InvalidCart(format!(
            "quantity for {} must be at least 1",
            line.product_id
        )));
    }
    Ok(())
}

fn order_id(order: &Order) -> Result<AggregateId, CheckoutError> {
    order.id().ok_or_else(|| {
        CheckoutError::Domain(DomainError::AggregateNotFound {
            aggregate_type: Order::aggregate_type(),
            aggregate_id: "<unplaced>".to_string(),
        })
    })
}

fn failure_reason(e: &CheckoutError) -> &'static str {
    match e {
        CheckoutError::EmptyCart | CheckoutError::InvalidCart(_) => "invalid_cart",
        CheckoutError::AddressNotFound(_) => "address_not_found",
        CheckoutError::ProductNotFound(_) => "product_not_found",
        CheckoutError::InsufficientStock { .. } => "insufficient_stock",
        CheckoutError::PromoInvalid(_) => "promo_invalid",
        CheckoutError::GatewayUnavailable { .. } => "gateway_unavailable",
        CheckoutError::GatewayRejected { .. } => "gateway_rejected",
        CheckoutError::CheckoutIdConflict(_) => "checkout_id_conflict",
        CheckoutError::Domain(_) => "internal",
    }
}
