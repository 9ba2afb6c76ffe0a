//! Shared application state and its wiring.

use std::sync::Arc;

use checkout::{
    CheckoutCoordinator, InMemoryAddressBook, InMemoryCatalog, PaymentGateway,
    PaymentGatewayAdapter, PaymentVerifier, RefundCoordinator,
};
use domain::{OrderService, PricingPolicy, PromoService};
use event_store::EventStore;
use projections::{CustomerOrdersView, Projection, ProjectionProcessor, PromoUsageView};

use crate::error::ApiError;

/// Gateway chosen at startup: the HTTP client or the in-process sandbox.
pub type SharedGateway = Arc<dyn PaymentGateway>;

pub type Checkout<S> =
    CheckoutCoordinator<S, InMemoryCatalog, InMemoryAddressBook, SharedGateway>;

/// External collaborators the server is started with.
pub struct Collaborators {
    pub catalog: InMemoryCatalog,
    pub addresses: InMemoryAddressBook,
    pub gateway: PaymentGatewayAdapter<SharedGateway>,
    pub pricing: PricingPolicy,
}

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub orders: OrderService<S>,
    pub promos: PromoService<S>,
    pub checkout: Checkout<S>,
    pub payments: PaymentVerifier<S>,
    pub refunds: RefundCoordinator<S, SharedGateway>,
    pub catalog: InMemoryCatalog,
    pub addresses: InMemoryAddressBook,
    pub currency: String,
    pub customer_orders: CustomerOrdersView,
    pub promo_usage: PromoUsageView,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
}

impl<S: EventStore> AppState<S> {
    /// Applies any events the read models have not seen yet.
    pub async fn catch_up(&self) -> Result<(), ApiError> {
        let report = self
            .projection_processor
            .run_catch_up()
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        tracing::debug!(applied = report.events_applied, "read models caught up");
        Ok(())
    }
}

/// Wires services, coordinators and read models over one event store.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    collaborators: Collaborators,
) -> Arc<AppState<S>> {
    let Collaborators {
        catalog,
        addresses,
        gateway,
        pricing,
    } = collaborators;

    let orders = OrderService::with_pricing(event_store.clone(), pricing);
    let promos = PromoService::new(event_store.clone());
    let payments = PaymentVerifier::new(orders.clone(), gateway.verifier().clone());
    let refunds = RefundCoordinator::new(orders.clone(), gateway.clone());
    let currency = gateway.currency().to_string();
    let checkout =
        CheckoutCoordinator::new(orders.clone(), catalog.clone(), addresses.clone(), gateway);

    let customer_orders = CustomerOrdersView::new();
    let promo_usage = PromoUsageView::new();

    let mut processor = ProjectionProcessor::new(event_store);
    processor.register(Box::new(customer_orders.clone()) as Box<dyn Projection>);
    processor.register(Box::new(promo_usage.clone()) as Box<dyn Projection>);

    Arc::new(AppState {
        orders,
        promos,
        checkout,
        payments,
        refunds,
        catalog,
        addresses,
        currency,
        customer_orders,
        promo_usage,
        projection_processor: Arc::new(processor),
    })
}
